pub mod contract;
pub mod order;
pub mod provider_mp_credentials;
pub mod quotation;
pub mod service;
