//! `SeaORM` entities.

pub mod assignment;
pub mod file_asset;
pub mod invoice;
pub mod meeting;
pub mod quote;
pub mod rating;
pub mod subscriber;
pub mod task_request;
pub mod user;
pub mod work_submission;

pub use assignment::Entity as Assignment;
pub use file_asset::Entity as FileAsset;
pub use invoice::Entity as Invoice;
pub use meeting::Entity as Meeting;
pub use quote::Entity as Quote;
pub use rating::Entity as Rating;
pub use subscriber::Entity as Subscriber;
pub use task_request::Entity as TaskRequest;
pub use user::Entity as User;
pub use work_submission::Entity as WorkSubmission;
