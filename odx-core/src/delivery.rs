//! Two-step delivery: attempt a page message, fall back to injection.
//!
//! The messaging channel is unreliable by design: a page opened before the
//! extension was installed or enabled has no Style Applier listening. A
//! `NoReceiver` failure is therefore not an error but the trigger for
//! on-demand injection: presentation assets first, behavioral script second.
//! There is no retry beyond the single injection attempt.

use crate::error::CoreResult;
use crate::platform::{MessageError, PageId, Platform};
use crate::protocol::{PageRequest, PageResponse};

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A live Applier answered.
    Answered(PageResponse),
    /// No Applier was listening; it was injected. When a resend was
    /// requested the answer to the resent request is carried here, if any.
    Injected(Option<PageResponse>),
    /// The page could not be reached or injected; it is left unaffected.
    Unreachable,
}

/// Install the presentation assets, then the behavioral script.
///
/// Order matters: the script references classes and variables the assets
/// define.
///
/// # Errors
///
/// Propagates the first failed install (restricted origin, closed page).
pub async fn inject_into(platform: &Platform, page: PageId) -> CoreResult<()> {
    platform.injector.install_assets(page).await?;
    platform.injector.install_script(page).await?;
    Ok(())
}

/// Attempt `request` against `page`; on `NoReceiver`, inject the Applier.
///
/// With `resend_after_inject`, the request is sent once more after a
/// successful injection so the freshly attached Applier picks up the values
/// immediately (the popup's preview path). Without it, the injected script's
/// own load step is trusted to fetch current state (the coordinator's
/// population pass).
pub async fn deliver(
    platform: &Platform,
    page: PageId,
    request: PageRequest,
    resend_after_inject: bool,
) -> Delivery {
    match platform.messaging.send_to_page(page, request.clone()).await {
        Ok(response) => Delivery::Answered(response),
        Err(MessageError::NoReceiver(_)) => match inject_into(platform, page).await {
            Ok(()) => {
                let response = if resend_after_inject {
                    platform.messaging.send_to_page(page, request).await.ok()
                } else {
                    None
                };
                Delivery::Injected(response)
            }
            Err(err) => {
                tracing::debug!("injection into {page} skipped: {err}");
                Delivery::Unreachable
            }
        },
        Err(err) => {
            tracing::debug!("delivery to {page} failed: {err}");
            Delivery::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryPlatform;
    use crate::platform::memory::{Installed, PageEnvelope};
    use crate::protocol::PageRequest;

    #[tokio::test]
    async fn answered_when_applier_listens() {
        let memory = MemoryPlatform::new();
        memory
            .tabs
            .insert_page(PageId(1), Some("https://example.com/"), true);
        let mut inbox = memory.messaging.attach_page(PageId(1));
        tokio::spawn(async move {
            while let Some(PageEnvelope { reply, .. }) = inbox.recv().await {
                let _ = reply.send(PageResponse::ack());
            }
        });

        let outcome = deliver(
            &memory.platform(),
            PageId(1),
            PageRequest::Reinitialize,
            false,
        )
        .await;
        assert_eq!(outcome, Delivery::Answered(PageResponse::ack()));
        assert!(memory.injector.calls().is_empty());
    }

    #[tokio::test]
    async fn no_receiver_triggers_ordered_injection() {
        let memory = MemoryPlatform::new();
        memory
            .tabs
            .insert_page(PageId(3), Some("https://example.com/"), true);

        let outcome = deliver(
            &memory.platform(),
            PageId(3),
            PageRequest::Reinitialize,
            false,
        )
        .await;
        assert_eq!(outcome, Delivery::Injected(None));
        assert_eq!(
            memory.injector.calls(),
            vec![(PageId(3), Installed::Assets), (PageId(3), Installed::Script)]
        );
    }

    #[tokio::test]
    async fn restricted_page_is_unreachable_and_silent() {
        let memory = MemoryPlatform::new();
        memory
            .tabs
            .insert_page(PageId(4), Some("chrome://extensions"), false);

        let outcome = deliver(
            &memory.platform(),
            PageId(4),
            PageRequest::Reinitialize,
            false,
        )
        .await;
        assert_eq!(outcome, Delivery::Unreachable);
        assert!(memory.injector.calls().is_empty());
    }

    #[tokio::test]
    async fn resend_reaches_the_freshly_injected_applier() {
        let memory = MemoryPlatform::new();
        memory
            .tabs
            .insert_page(PageId(5), Some("https://example.com/"), true);

        // The script hook attaches a listener, as a real injection would.
        let messaging = std::sync::Arc::clone(&memory.messaging);
        memory.injector.set_script_hook(move |page| {
            let mut inbox = messaging.attach_page(page);
            tokio::spawn(async move {
                while let Some(PageEnvelope { reply, .. }) = inbox.recv().await {
                    let _ = reply.send(PageResponse::ack());
                }
            });
        });

        let outcome = deliver(
            &memory.platform(),
            PageId(5),
            PageRequest::GetState,
            true,
        )
        .await;
        assert_eq!(outcome, Delivery::Injected(Some(PageResponse::ack())));
    }
}
