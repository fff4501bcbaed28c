pub mod login;

pub use login::{login, login_flows, logout, supports_password_login};
