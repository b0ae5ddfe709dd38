pub mod owner;
pub mod principal;
pub mod token;

pub use owner::{OwnerLoader, OwnerRef, OwnerRegistry, Tokenable};
pub use principal::Principal;
pub use token::{NewTokenRecord, TokenId, TokenRecord, TokenRecordUpdate};
