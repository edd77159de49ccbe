use std::fmt::Display;

/// Kind of calendar change notification. Each kind has its own exchange, work
/// queue and dead letter queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmQueue {
    Created,
    Updated,
    Deleted,
    Cancel,
    Request,
}

/// What a notification does to the alarms of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmHandlerKind {
    CreateOrUpdate,
    Delete,
}

impl AlarmQueue {
    pub const ALL: [AlarmQueue; 5] = [
        AlarmQueue::Created,
        AlarmQueue::Updated,
        AlarmQueue::Deleted,
        AlarmQueue::Cancel,
        AlarmQueue::Request,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Cancel => "cancel",
            Self::Request => "request",
        }
    }

    pub fn exchange(&self) -> String {
        format!("calendar:event:alarm:{}", self.suffix())
    }

    pub fn queue(&self) -> String {
        format!("tcalendar:event:alarm:{}", self.suffix())
    }

    pub fn dead_letter_queue(&self) -> String {
        format!("{}:dead-letter", self.queue())
    }

    pub fn handler(&self) -> AlarmHandlerKind {
        match self {
            Self::Created | Self::Updated | Self::Request => AlarmHandlerKind::CreateOrUpdate,
            Self::Deleted | Self::Cancel => AlarmHandlerKind::Delete,
        }
    }
}

impl Display for AlarmQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.suffix())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn queue_names() {
        assert_eq!(
            AlarmQueue::Created.exchange(),
            "calendar:event:alarm:created"
        );
        assert_eq!(AlarmQueue::Cancel.queue(), "tcalendar:event:alarm:cancel");
        assert_eq!(
            AlarmQueue::Request.dead_letter_queue(),
            "tcalendar:event:alarm:request:dead-letter"
        );
    }

    #[test]
    fn handlers_per_kind() {
        assert_eq!(AlarmQueue::Updated.handler(), AlarmHandlerKind::CreateOrUpdate);
        assert_eq!(AlarmQueue::Request.handler(), AlarmHandlerKind::CreateOrUpdate);
        assert_eq!(AlarmQueue::Deleted.handler(), AlarmHandlerKind::Delete);
        assert_eq!(AlarmQueue::Cancel.handler(), AlarmHandlerKind::Delete);
    }
}
