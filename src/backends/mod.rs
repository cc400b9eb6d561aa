//! HTTP integrations.
//!
//! # Data Flow
//! ```text
//! EnvelopeCall ──► PrimaryApi ──► primary API ({code, message, data})
//!                     └─ rotated access/refresh headers → Reply::rotate
//! BookingCall  ──► BookingApi ──► booking service ({code: "0", data}, `token` header)
//! IdentityCall ──► IdentityApi ──► identity service ({code: 0, data}, bearer token)
//!
//! Re-login strategies:
//!     RefreshTokenStrategy  (Primary: refresh token → new token pair)
//!     TokenExchangeStrategy (Booking: SSO cookie → redirects → token query param)
//!     IdentityLogin         (Identity: stored account → access_token, via StoredAccountStrategy)
//! ```

pub mod booking;
pub mod identity;
pub mod primary;

pub use booking::{BookingApi, BookingCall, TokenExchangeStrategy};
pub use identity::{IdentityApi, IdentityCall, IdentityLogin};
pub use primary::{AcademicCookie, EnvelopeCall, PrimaryApi, RefreshTokenStrategy, TokenPair};
