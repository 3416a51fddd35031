pub mod password;
pub mod validation;

pub use password::{
    hash_password, hash_password_async, verify_password, verify_password_async, Password,
    PasswordHashString,
};
pub use validation::ValidatedJson;
