pub mod issuer;
pub mod zts;
