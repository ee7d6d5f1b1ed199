use std::time::{Duration, Instant};

use futures_util::{StreamExt, stream};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::errors::{RecognizeError, RecognizeResult};
use crate::providers::{ProviderOutcome, RawProviderResult, RecognitionProvider};

const MAX_CONCURRENT_PROVIDERS: usize = 4;

/// Fans the preprocessed image out to every provider concurrently and
/// collects results in completion order. Individual failures, timeouts,
/// and empty transcriptions are recorded, not propagated; the call as a
/// whole fails only when no provider produced usable text.
///
/// Dropping the returned future aborts every in-flight provider call.
pub async fn dispatch(
    providers: &[Box<dyn RecognitionProvider>],
    png: &[u8],
    language: &str,
    per_call_timeout: Duration,
) -> RecognizeResult<Vec<RawProviderResult>> {
    if providers.is_empty() {
        warn!("no recognition providers configured; set OCR_SPACE_API_KEY or GOOGLE_VISION_API_KEY");
        return Err(RecognizeError::AllProvidersFailed { attempted: 0 });
    }

    let results: Vec<RawProviderResult> = stream::iter(providers.iter())
        .map(|provider| call_one(provider.as_ref(), png, language, per_call_timeout))
        .buffer_unordered(MAX_CONCURRENT_PROVIDERS)
        .collect()
        .await;

    if !results.iter().any(RawProviderResult::is_usable) {
        return Err(RecognizeError::AllProvidersFailed {
            attempted: results.len(),
        });
    }
    Ok(results)
}

async fn call_one(
    provider: &dyn RecognitionProvider,
    png: &[u8],
    language: &str,
    deadline: Duration,
) -> RawProviderResult {
    let started = Instant::now();
    let outcome = timeout(deadline, provider.recognize(png, language)).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(text)) => {
            let outcome = if text.text.trim().is_empty() {
                warn!(provider = provider.id(), latency_ms, "provider returned empty text");
                ProviderOutcome::Empty
            } else {
                debug!(
                    provider = provider.id(),
                    latency_ms,
                    confidence = text.confidence,
                    "provider returned text"
                );
                ProviderOutcome::Text
            };
            RawProviderResult {
                provider_id: provider.id().to_string(),
                raw_text: text.text,
                reported_confidence: text.confidence,
                latency_ms,
                outcome,
            }
        }
        Ok(Err(error)) => {
            warn!(provider = provider.id(), latency_ms, %error, "provider call failed");
            RawProviderResult {
                provider_id: provider.id().to_string(),
                raw_text: String::new(),
                reported_confidence: None,
                latency_ms,
                outcome: ProviderOutcome::Failed,
            }
        }
        Err(_) => {
            warn!(
                provider = provider.id(),
                timeout_ms = deadline.as_millis() as u64,
                "provider call timed out"
            );
            RawProviderResult {
                provider_id: provider.id().to_string(),
                raw_text: String::new(),
                reported_confidence: None,
                latency_ms,
                outcome: ProviderOutcome::TimedOut,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderText, RecognizeFuture};
    use anyhow::anyhow;

    enum Behavior {
        Text(&'static str, Option<f32>),
        Empty,
        Fail,
        Hang,
        SlowText(&'static str, Duration),
    }

    struct FakeProvider {
        id: &'static str,
        behavior: Behavior,
    }

    impl RecognitionProvider for FakeProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn recognize<'a>(&'a self, _png: &'a [u8], _language: &'a str) -> RecognizeFuture<'a> {
            Box::pin(async move {
                match &self.behavior {
                    Behavior::Text(text, confidence) => Ok(ProviderText {
                        text: text.to_string(),
                        confidence: *confidence,
                    }),
                    Behavior::Empty => Ok(ProviderText {
                        text: "   ".to_string(),
                        confidence: None,
                    }),
                    Behavior::Fail => Err(anyhow!("boom")),
                    Behavior::Hang => {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        unreachable!("should be cut off by the timeout");
                    }
                    Behavior::SlowText(text, delay) => {
                        tokio::time::sleep(*delay).await;
                        Ok(ProviderText {
                            text: text.to_string(),
                            confidence: None,
                        })
                    }
                }
            })
        }
    }

    fn boxed(id: &'static str, behavior: Behavior) -> Box<dyn RecognitionProvider> {
        Box::new(FakeProvider { id, behavior })
    }

    #[tokio::test]
    async fn no_providers_reads_as_zero_attempts_failed() {
        let err = dispatch(&[], b"png", "eng", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecognizeError::AllProvidersFailed { attempted: 0 }
        ));
    }

    #[tokio::test]
    async fn partial_failures_are_tolerated() {
        let providers = vec![
            boxed("bad", Behavior::Fail),
            boxed("good", Behavior::Text("5x4 6x2 3", Some(81.0))),
            boxed("blank", Behavior::Empty),
        ];
        let results = dispatch(&providers, b"png", "eng", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        let usable: Vec<_> = results.iter().filter(|r| r.is_usable()).collect();
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].provider_id, "good");
        assert_eq!(usable[0].raw_text, "5x4 6x2 3");
    }

    #[tokio::test]
    async fn all_failures_surface_as_all_providers_failed() {
        let providers = vec![
            boxed("bad", Behavior::Fail),
            boxed("blank", Behavior::Empty),
        ];
        let err = dispatch(&providers, b"png", "eng", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecognizeError::AllProvidersFailed { attempted: 2 }
        ));
    }

    #[tokio::test]
    async fn hanging_provider_is_timed_out() {
        let providers = vec![
            boxed("stuck", Behavior::Hang),
            boxed("good", Behavior::Text("x^2", None)),
        ];
        let results = dispatch(&providers, b"png", "eng", Duration::from_millis(50))
            .await
            .unwrap();
        let stuck = results.iter().find(|r| r.provider_id == "stuck").unwrap();
        assert_eq!(stuck.outcome, ProviderOutcome::TimedOut);
        assert!(!stuck.is_usable());
    }

    #[tokio::test]
    async fn results_arrive_in_completion_order() {
        let providers = vec![
            boxed("slow", Behavior::SlowText("slow", Duration::from_millis(80))),
            boxed("fast", Behavior::Text("fast", None)),
        ];
        let results = dispatch(&providers, b"png", "eng", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(results[0].provider_id, "fast");
        assert_eq!(results[1].provider_id, "slow");
    }
}
