pub mod eventsub;
pub mod stream;
pub mod token;
pub mod users;
