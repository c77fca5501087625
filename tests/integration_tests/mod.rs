// Integration tests module

pub mod keyring_tests;
pub mod route_tests;
