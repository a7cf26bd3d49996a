//! Domain types shared by the grant handlers.

pub mod client;
pub mod consent;

pub use client::{
    Client, ClientLifespans, ClientValidationError, GrantLifespans, GrantType, LifespanKind,
};
pub use consent::ConsentRecord;
