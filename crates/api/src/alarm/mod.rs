pub mod handle_event_alarm;
pub mod trigger_alarms;

use calendar_alarms_domain::{EventDocument, MailAddress, User};
use calendar_alarms_infra::AlarmContext;
use tracing::warn;

/// Whether `user` wants reminders. Defaults to enabled, also when the
/// setting cannot be read.
pub(crate) async fn alarms_enabled(user: &User, ctx: &AlarmContext) -> bool {
    match ctx.repos.user_settings.find_alarms_enabled(&user.id).await {
        Ok(enabled) => enabled.unwrap_or(true),
        Err(e) => {
            warn!(
                "Unable to read the alarm setting of user: {}, assuming enabled. Err: {:?}",
                user.id, e
            );
            true
        }
    }
}

/// Everyone who may hold an alarm for `document`: the owner and the
/// attendees of every VALARM
pub(crate) fn alarm_recipients(document: &EventDocument, owner: &User) -> Vec<MailAddress> {
    let mut recipients = vec![owner.email.clone()];
    let attendees = document
        .events
        .iter()
        .flat_map(|event| event.alarms.iter())
        .flat_map(|alarm| alarm.attendees.iter())
        .filter_map(|attendee| MailAddress::from_cal_address(attendee).ok());
    for attendee in attendees {
        if !recipients.contains(&attendee) {
            recipients.push(attendee);
        }
    }
    recipients
}
