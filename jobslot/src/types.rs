use uuid::Uuid;

pub type Args = Vec<String>;
pub type JobId = Uuid;
/// One unit of job output as it is buffered and fanned out to viewers.
pub type Chunk = bytes::Bytes;
