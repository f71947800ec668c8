pub mod entities;
pub mod enums;
