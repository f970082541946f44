pub mod accounts;
pub mod auth_api;
pub mod configuration;
pub mod confirmation_api;
pub mod network;
pub mod telemetry;
pub mod time_api;

// Re-exports for convenience
pub use accounts::FileAccountRepository;
pub use auth_api::SteamAuthGateway;
pub use confirmation_api::SteamConfirmationTransport;
pub use time_api::SteamTimeEndpoint;
