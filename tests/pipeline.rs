use std::sync::{Arc, Mutex};

use anyhow::anyhow;

use mathsnap::llm::{AdjudicateFuture, DisambiguationModel, Disambiguator};
use mathsnap::providers::{ProviderText, RecognitionProvider, RecognizeFuture};
use mathsnap::settings::Settings;
use mathsnap::{RecognitionRequest, RecognizeError, Recognizer};

struct FakeProvider {
    id: &'static str,
    reply: Result<&'static str, &'static str>,
}

impl RecognitionProvider for FakeProvider {
    fn id(&self) -> &str {
        self.id
    }

    fn recognize<'a>(&'a self, _png: &'a [u8], _language: &'a str) -> RecognizeFuture<'a> {
        Box::pin(async move {
            match self.reply {
                Ok(text) => Ok(ProviderText {
                    text: text.to_string(),
                    confidence: None,
                }),
                Err(message) => Err(anyhow!(message)),
            }
        })
    }
}

struct EchoModel {
    reply: &'static str,
    seen_prompt: Arc<Mutex<Option<String>>>,
}

impl EchoModel {
    fn new(reply: &'static str) -> Self {
        Self {
            reply,
            seen_prompt: Arc::new(Mutex::new(None)),
        }
    }
}

impl DisambiguationModel for EchoModel {
    fn id(&self) -> &str {
        "echo"
    }

    fn adjudicate<'a>(&'a self, prompt: &'a str) -> AdjudicateFuture<'a> {
        Box::pin(async move {
            *self.seen_prompt.lock().unwrap() = Some(prompt.to_string());
            Ok(self.reply.to_string())
        })
    }
}

fn provider(id: &'static str, text: &'static str) -> Box<dyn RecognitionProvider> {
    Box::new(FakeProvider {
        id,
        reply: Ok(text),
    })
}

fn failing_provider(id: &'static str) -> Box<dyn RecognitionProvider> {
    Box::new(FakeProvider {
        id,
        reply: Err("unavailable"),
    })
}

/// Plain white capture with a dark stroke, as the camera would hand over.
fn sample_png() -> Vec<u8> {
    let mut image = image::RgbImage::from_pixel(64, 64, image::Rgb([250, 250, 250]));
    for x in 8..56 {
        image.put_pixel(x, 30, image::Rgb([15, 15, 15]));
    }
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
    bytes
}

#[tokio::test]
async fn polynomial_scan_resolves_to_canonical_integral() {
    let recognizer = Recognizer::new(
        vec![provider("ocr-a", "5x4 6x2 3")],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png());
    let outcome = recognizer.recognize(&request).await.unwrap();

    assert_eq!(outcome.consensus.final_text, "∫ (5x^4 - 6x^2 + 3) dx");
    assert!(outcome.consensus.final_confidence >= 80.0);
    // The raw and corrected readings survive as lower-ranked groups.
    assert!(outcome.consensus.groups.len() > 1);
}

#[tokio::test]
async fn model_confirmation_raises_the_winner() {
    let baseline = Recognizer::new(
        vec![provider("ocr-a", "5x4 6x2 3")],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png());
    let without_model = baseline.recognize(&request).await.unwrap();

    let recognizer = Recognizer::new(
        vec![provider("ocr-a", "5x4 6x2 3")],
        Disambiguator::with_model(Box::new(EchoModel::new("∫ (5x^4 - 6x^2 + 3) dx"))),
        Settings::default(),
    );
    let with_model = recognizer.recognize(&request).await.unwrap();

    assert_eq!(with_model.consensus.final_text, without_model.consensus.final_text);
    assert!(with_model.consensus.final_confidence >= without_model.consensus.final_confidence);
    assert!(with_model.consensus.agreement_count > without_model.consensus.agreement_count);
}

#[tokio::test]
async fn hint_reaches_the_model_prompt() {
    let model = EchoModel::new("x^2");
    let seen = model.seen_prompt.clone();
    let recognizer = Recognizer::new(
        vec![provider("ocr-a", "x2")],
        Disambiguator::with_model(Box::new(model)),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png()).with_hint("x^2 + 1");
    recognizer.recognize(&request).await.unwrap();

    let prompt = seen.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("x^2 + 1"));
    assert!(prompt.contains("x2"));
}

#[tokio::test]
async fn agreeing_providers_outrank_a_lone_reading() {
    let recognizer = Recognizer::new(
        vec![
            provider("ocr-a", "sin x"),
            provider("ocr-b", "SIN X"),
            provider("ocr-c", "five by four"),
        ],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png());
    let outcome = recognizer.recognize(&request).await.unwrap();

    assert_eq!(outcome.consensus.final_text.to_lowercase(), "sin x");
    assert_eq!(outcome.consensus.agreement_count, 2);
}

#[tokio::test]
async fn all_provider_failures_surface_as_one_error() {
    let recognizer = Recognizer::new(
        vec![failing_provider("ocr-a"), failing_provider("ocr-b")],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png());
    let err = recognizer.recognize(&request).await.unwrap_err();
    assert!(matches!(
        err,
        RecognizeError::AllProvidersFailed { attempted: 2 }
    ));
}

#[tokio::test]
async fn pure_noise_yields_no_candidates() {
    let recognizer = Recognizer::new(
        vec![provider("ocr-a", "..,,--")],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(sample_png());
    let err = recognizer.recognize(&request).await.unwrap_err();
    assert!(matches!(err, RecognizeError::NoCandidates));
}

#[tokio::test]
async fn undecodable_image_fails_before_dispatch() {
    let recognizer = Recognizer::new(
        vec![provider("ocr-a", "x")],
        Disambiguator::disabled(),
        Settings::default(),
    );
    let request = RecognitionRequest::from_bytes(b"definitely not an image".to_vec());
    let err = recognizer.recognize(&request).await.unwrap_err();
    assert!(matches!(err, RecognizeError::ImageDecode(_)));
}
