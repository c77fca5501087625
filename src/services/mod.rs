pub mod events;
pub mod gate;
pub mod keyring;
pub mod transaction;
