pub mod feeditem;
pub mod fetch_status;
pub mod page;
pub mod timestamp;
pub mod user;

pub use feeditem::{Feeditem, FeeditemKey};
pub use fetch_status::FetchStatus;
pub use page::{PagemonitorPage, UserPagemonitor};
pub use user::{User, UserFeed};
