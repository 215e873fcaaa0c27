pub mod clients;
pub mod request_object;
