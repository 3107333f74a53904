pub mod gateway_kind;
pub mod payment;
pub mod payment_account;
pub mod plan;
pub mod recovery;
pub mod subscription;
