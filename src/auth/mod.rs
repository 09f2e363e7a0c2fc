pub mod jwt;

pub use jwt::SessionVerifier;
