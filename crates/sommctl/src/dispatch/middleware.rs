//! Middleware chain around the base action handler.
//!
//! Each middleware is `Handler -> Handler`; composition is plain
//! function composition and works for zero, one, or N layers. The
//! production order, outermost first, is error handling, retry
//! tracking, validation.

use crate::dispatch::context::DispatchContext;
use crate::dispatch::phase::Phase;
use crate::dispatch::retry::RetryTracker;
use crate::dispatch::validator::{self, ValidatorMode};
use crate::dispatch::Action;
use crate::fault::Fault;
use somm_common::{AgentMessage, Chip, MessagePayload, Role};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, warn};

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), Fault>> + Send>>;
pub type Handler = Arc<dyn Fn(Arc<DispatchContext>, Action) -> HandlerFuture + Send + Sync>;
pub type Middleware = Box<dyn Fn(Handler) -> Handler>;

/// Wrap `base` with `layers`, first element outermost.
pub fn compose(layers: Vec<Middleware>, base: Handler) -> Handler {
    layers
        .into_iter()
        .rev()
        .fold(base, |handler, layer| layer(handler))
}

/// The full production chain.
pub fn production_chain(mode: ValidatorMode, base: Handler) -> Handler {
    compose(
        vec![error_handling(), retry_tracking(), validation(mode)],
        base,
    )
}

/// Drops (warn mode) or rejects (strict mode) actions whose
/// prerequisites are unmet; the inner handler never runs for them.
pub fn validation(mode: ValidatorMode) -> Middleware {
    Box::new(move |next: Handler| {
        Arc::new(move |ctx: Arc<DispatchContext>, action: Action| -> HandlerFuture {
            let next = next.clone();
            Box::pin(async move {
                if let Err(reason) = validator::check(&ctx, &action) {
                    return match mode {
                        ValidatorMode::Warn => {
                            warn!("  [-] dropped {}: {}", action.kind(), reason);
                            Ok(())
                        }
                        ValidatorMode::Strict => Err(Fault::Validation(reason)),
                    };
                }
                next(ctx, action).await
            })
        })
    })
}

/// Records retryable actions before they run and flips the succeeded
/// flag only when the inner chain returns cleanly.
pub fn retry_tracking() -> Middleware {
    Box::new(|next: Handler| {
        Arc::new(move |ctx: Arc<DispatchContext>, action: Action| -> HandlerFuture {
            let next = next.clone();
            Box::pin(async move {
                let tracked = RetryTracker::is_tracked(action.kind());
                if tracked {
                    ctx.retry.record(action.clone());
                }
                let outcome = next(ctx.clone(), action).await;
                if tracked && outcome.is_ok() {
                    ctx.retry.mark_succeeded();
                }
                outcome
            })
        })
    })
}

/// Outermost layer: no fault escapes. Every failure becomes exactly
/// one transcript error message plus the error phase.
pub fn error_handling() -> Middleware {
    Box::new(|next: Handler| {
        Arc::new(move |ctx: Arc<DispatchContext>, action: Action| -> HandlerFuture {
            let next = next.clone();
            Box::pin(async move {
                if let Err(fault) = next(ctx.clone(), action.clone()).await {
                    error!("  [-] {} failed: {} ({})", action.kind(), fault, fault.kind());
                    ctx.push_message(AgentMessage::new(
                        Role::Agent,
                        MessagePayload::Error {
                            kind: fault.kind().to_string(),
                            message: fault.user_message(),
                            retryable: fault.retryable(),
                        },
                    ));
                    let mut chips = Vec::new();
                    if fault.retryable() {
                        chips.push(Chip::new("retry", "Try again"));
                    }
                    chips.push(Chip::new("start_over", "Start over"));
                    ctx.push_message(AgentMessage::new(
                        Role::Agent,
                        MessagePayload::Chips {
                            prompt: "What would you like to do?".to_string(),
                            chips,
                            processing: false,
                        },
                    ));
                    ctx.set_phase(Phase::Error);
                }
                Ok(())
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_base(calls: Arc<AtomicUsize>) -> Handler {
        Arc::new(move |_ctx, _action| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    fn failing_base(fault: Fault) -> Handler {
        Arc::new(move |_ctx, _action| {
            let fault = fault.clone();
            Box::pin(async move { Err(fault) })
        })
    }

    #[tokio::test]
    async fn test_compose_zero_layers_is_identity() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = compose(vec![], counting_base(calls.clone()));
        let ctx = Arc::new(DispatchContext::default());
        handler(ctx, Action::StartOver).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validation_drops_in_warn_mode() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = compose(
            vec![validation(ValidatorMode::Warn)],
            counting_base(calls.clone()),
        );
        let ctx = Arc::new(DispatchContext::default());
        // add_to_cellar in greeting with no identification
        handler(ctx, Action::AddToCellar).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_faults_in_strict_mode() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = compose(
            vec![validation(ValidatorMode::Strict)],
            counting_base(calls.clone()),
        );
        let ctx = Arc::new(DispatchContext::default());
        let outcome = handler(ctx, Action::AddToCellar).await;
        assert!(matches!(outcome, Err(Fault::Validation(_))));
    }

    #[tokio::test]
    async fn test_error_handler_converts_fault_to_transcript_and_phase() {
        let handler = compose(
            vec![error_handling()],
            failing_base(Fault::Api(somm_common::IdentifyError::Timeout("t".into()))),
        );
        let ctx = Arc::new(DispatchContext::default());
        handler(ctx.clone(), Action::StartOver).await.unwrap();

        assert_eq!(ctx.phase(), Phase::Error);
        ctx.with_transcript(|t| {
            let error = t
                .messages()
                .iter()
                .find(|m| matches!(m.payload, MessagePayload::Error { .. }))
                .expect("error message");
            match &error.payload {
                MessagePayload::Error { kind, retryable, .. } => {
                    assert_eq!(kind, "timeout");
                    assert!(*retryable);
                }
                _ => unreachable!(),
            }
            // Retry offered for a retryable fault
            let chips = t
                .messages()
                .iter()
                .find_map(|m| match &m.payload {
                    MessagePayload::Chips { chips, .. } => Some(chips.clone()),
                    _ => None,
                })
                .expect("chips message");
            assert!(chips.iter().any(|c| c.id == "retry"));
        });
    }

    #[tokio::test]
    async fn test_retry_tracking_marks_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = compose(vec![retry_tracking()], counting_base(calls.clone()));
        let ctx = Arc::new(DispatchContext::default());
        handler(
            ctx.clone(),
            Action::SubmitText {
                text: "Rioja".to_string(),
            },
        )
        .await
        .unwrap();
        assert!(ctx.retry.last_action().is_some());
    }
}
