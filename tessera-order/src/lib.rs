pub mod checkin;
pub mod fulfillment;
pub mod gateway;
pub mod intents;
pub mod orchestrator;
pub mod verification;

pub use checkin::{CheckInError, CheckInService};
pub use fulfillment::{IssueError, IssuedTicket, TicketIssuer};
pub use gateway::MockPaymentGateway;
pub use intents::{GatewayRefs, IntentError, IntentTracker};
pub use orchestrator::{
    BookingDeps, BookingError, BookingOrchestrator, ConfirmationOutcome, ReservationReceipt,
    ReservationRequest,
};
pub use verification::{PaymentVerifier, VerificationError, Verified};
