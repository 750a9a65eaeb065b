pub mod users;
pub mod wsroute;
