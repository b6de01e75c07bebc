pub mod client;
pub mod quote_source;

pub use client::CryptoCompareClient;
pub use quote_source::CryptoCompareQuoteSource;
