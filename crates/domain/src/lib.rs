mod alarm_event;
mod alarm_instant;
mod alarm_queue;
mod event;
mod event_path;
pub mod jcal;
mod lease;
mod recipient_filter;
pub mod recurrence;
mod shared;
mod trigger;
mod user;

pub use alarm_event::{AlarmAction, AlarmEvent, EventUid};
pub use alarm_instant::{AlarmInstant, AlarmInstantCalculator, AlarmInstantError};
pub use alarm_queue::{AlarmHandlerKind, AlarmQueue};
pub use event::{
    AlarmTrigger, Attendee, EventDocument, EventStatus, EventTime, PartStat, TriggerRelation,
    VAlarm, VEvent,
};
pub use event_path::{EventPath, InvalidEventPathError};
pub use lease::{Lease, LeaseError, LeaseKey};
pub use recipient_filter::RecipientFilter;
pub use shared::mail_address::{InvalidMailAddressError, MailAddress};
pub use trigger::{parse_duration, InvalidTriggerError};
pub use user::User;
