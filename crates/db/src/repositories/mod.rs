//! Repositories wrapping entity queries.

mod assignment;
mod file_asset;
mod invoice;
mod meeting;
mod quote;
mod rating;
mod subscriber;
mod task;
mod user;
mod work_submission;

pub use assignment::AssignmentRepository;
pub use file_asset::FileAssetRepository;
pub use invoice::InvoiceRepository;
pub use meeting::MeetingRepository;
pub use quote::QuoteRepository;
pub use rating::{RatingRepository, RatingSummary, RatingVisibility};
pub use subscriber::SubscriberRepository;
pub use task::TaskRepository;
pub use user::UserRepository;
pub use work_submission::WorkSubmissionRepository;
