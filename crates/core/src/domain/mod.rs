pub mod condition;
pub mod contact;
pub mod pricing_config;
pub mod promise;
pub mod quote;
pub mod service;
