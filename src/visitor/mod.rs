pub mod form;
pub mod modal;
pub mod resolver;

pub use form::{ConsentField, ConsentFields, ConsentFormUi, FieldError, FieldErrors, FormRequest};
pub use modal::EngagementModalPolicy;
pub use resolver::{EngagementOutcome, IdentityState, VisitorIdentityResolver};
