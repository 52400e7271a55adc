pub mod blob;
pub mod object;
pub mod object_id;
pub mod object_type;

pub const OBJECT_ID_LENGTH: usize = 40;
