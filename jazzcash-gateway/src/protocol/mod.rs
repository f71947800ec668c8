pub mod codes;
pub mod fields;
pub mod signer;
