// Policy commands: validate, check, apply
pub mod policy;
