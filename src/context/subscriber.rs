//! Subscriber callback contract.

use crate::context::survey::SurveyResponse;
use std::sync::Arc;

/// Receives survey and outcome callbacks for one shared context.
///
/// `pending` must answer `response` exactly once: `accept`, `reject`, or `defer`
/// followed by a later answer on a clone of the response. Errors returned from any
/// callback are logged by the slot and never abort delivery to other subscribers.
pub trait ContextSubscriber: Send + Sync {
    fn pending(&self, response: &SurveyResponse) -> anyhow::Result<()>;

    fn committed(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn canceled(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Identity comparison for subscriber handles.
pub(crate) fn same_subscriber(a: &Arc<dyn ContextSubscriber>, b: &Arc<dyn ContextSubscriber>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Address of the subscriber instance, for log fields. Clones of one handle share it.
pub(crate) fn subscriber_label(subscriber: &Arc<dyn ContextSubscriber>) -> String {
    format!("{:p}", Arc::as_ptr(subscriber) as *const ())
}
