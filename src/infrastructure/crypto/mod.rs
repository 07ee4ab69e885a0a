//! Cryptographic helpers (password hashing)

pub mod password;
