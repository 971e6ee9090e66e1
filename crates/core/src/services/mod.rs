//! Business logic services.

#![allow(missing_docs)]

pub mod asset;
pub mod assignment;
pub mod billing;
pub mod marketing;
pub mod meeting;
pub mod notification;
pub mod payment;
pub mod quote;
pub mod rating;
pub mod task;
pub mod user;

pub use asset::{AssetService, FileDownload, StoredUploads, UploadedFile};
pub use assignment::{
    AssignmentCreated, AssignmentResponse, AssignmentService, BulkAssignOutcome, WorkSubmitted,
};
pub use billing::{InvoiceIssue, round_money};
pub use marketing::{MarketingService, subscribers_csv};
pub use meeting::{MeetingService, MeetingUpdate, ScheduleMeetingInput, render_ics};
pub use notification::{
    DeliveryOutcome, EmailAttachment, EmailContext, EmailTemplate, InlineImage, MailError, Mailer,
    NotificationService, OutgoingEmail, RecordingMailer, SmtpMailer,
};
pub use payment::{
    CheckoutOrder, CheckoutOutcome, CheckoutSession, GatewayError, PaymentGateway, PaymentReturn,
    PaymentService, PesapalGateway, SyncOutcome, TransactionStatus,
};
pub use quote::{
    CreateQuoteInput, DeclineOutcome, DeclineQuoteInput, QuoteAccepted, QuoteCreated,
    QuoteService,
};
pub use rating::{RatingInput, RatingModeration, RatingService};
pub use task::{
    BulkStatusOutcome, CreateTaskInput, StatusChange, TaskCreated, TaskDetail, TaskService,
};
pub use user::{RegisterInput, Session, UserService};
