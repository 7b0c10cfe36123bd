pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod retry;
pub mod service;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use retry::RetryPolicy;
pub use service::{
    CloseQuoteRequest, ClosedQuote, CreateQuoteRequest, CreatedQuote, PricedQuote,
    QuotingRepositories, QuotingService,
};
