use super::ImageResolver;

/// Retries after the first failed load before switching to the fallback pool.
pub const MAX_RETRIES: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    Idle,
    /// Low-priority image showing the placeholder until promoted.
    Deferred { placeholder: String },
    Loading { url: String },
    Retrying { attempt: u8, url: String },
    Loaded { url: String },
    /// Every variant failed; `url` comes from the fallback pool.
    Exhausted { url: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEvent {
    Start,
    /// Swap the optimized URL in for a deferred image.
    Promote,
    LoadSucceeded,
    LoadFailed,
}

/// Per-image load state machine, driven by events from whatever renders it.
pub struct ImageLoader {
    key: String,
    optimized: String,
    priority: bool,
    resolver: ImageResolver,
    state: ImageState,
    on_loaded: Option<Box<dyn FnMut(&str) + Send>>,
}

impl ImageLoader {
    /// `key` identifies the image for picking a stable fallback, usually the
    /// book id.
    pub fn new(
        key: impl Into<String>,
        provider_url: Option<&str>,
        priority: bool,
        resolver: ImageResolver,
    ) -> Self {
        let optimized = resolver.optimize(provider_url);
        Self {
            key: key.into(),
            optimized,
            priority,
            resolver,
            state: ImageState::Idle,
            on_loaded: None,
        }
    }

    pub fn on_loaded(mut self, callback: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_loaded = Some(Box::new(callback));
        self
    }

    pub fn state(&self) -> &ImageState {
        &self.state
    }

    /// The URL that should currently be displayed.
    pub fn current_url(&self) -> &str {
        match &self.state {
            ImageState::Idle => self.resolver.placeholder(),
            ImageState::Deferred { placeholder } => placeholder,
            ImageState::Loading { url }
            | ImageState::Retrying { url, .. }
            | ImageState::Loaded { url }
            | ImageState::Exhausted { url } => url,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ImageState::Loaded { .. } | ImageState::Exhausted { .. }
        )
    }

    pub fn handle(&mut self, event: ImageEvent) -> &ImageState {
        let next = match (&self.state, event) {
            (ImageState::Idle, ImageEvent::Start) if self.priority => Some(ImageState::Loading {
                url: self.optimized.clone(),
            }),
            (ImageState::Idle, ImageEvent::Start) => Some(ImageState::Deferred {
                placeholder: self.resolver.placeholder().to_string(),
            }),
            (ImageState::Idle | ImageState::Deferred { .. }, ImageEvent::Promote) => {
                Some(ImageState::Loading {
                    url: self.optimized.clone(),
                })
            }
            (ImageState::Loading { url }, ImageEvent::LoadSucceeded)
            | (ImageState::Retrying { url, .. }, ImageEvent::LoadSucceeded) => {
                Some(ImageState::Loaded { url: url.clone() })
            }
            (ImageState::Loading { url }, ImageEvent::LoadFailed) => Some(ImageState::Retrying {
                attempt: 1,
                url: self.resolver.retry_variant(url, 1),
            }),
            (ImageState::Retrying { attempt, url }, ImageEvent::LoadFailed) => {
                if *attempt < MAX_RETRIES {
                    let attempt = attempt + 1;
                    Some(ImageState::Retrying {
                        attempt,
                        url: self.resolver.retry_variant(url, attempt),
                    })
                } else {
                    tracing::debug!(key = %self.key, "image retries exhausted; using fallback pool");
                    Some(ImageState::Exhausted {
                        url: self.resolver.fallback_for(&self.key).to_string(),
                    })
                }
            }
            _ => None,
        };

        if let Some(next) = next {
            self.state = next;
            if let (ImageState::Loaded { url }, Some(callback)) = (&self.state, self.on_loaded.as_mut()) {
                callback(url);
            }
        }
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::FALLBACK_POOL;
    use crate::model::DEFAULT_BOOK_IMAGE;
    use std::sync::{Arc, Mutex};

    const COVER: &str = "http://books.google.com/books/content?id=abc&zoom=1&edge=curl";

    fn resolver() -> ImageResolver {
        ImageResolver::new(DEFAULT_BOOK_IMAGE, "t0k3n")
    }

    #[test]
    fn priority_image_loads_optimized_url_first() {
        let mut loader = ImageLoader::new("google:abc", Some(COVER), true, resolver());
        loader.handle(ImageEvent::Start);
        let url = loader.current_url().to_string();
        assert!(url.starts_with("https://"));
        assert!(!url.contains("edge=curl"));

        loader.handle(ImageEvent::LoadSucceeded);
        assert_eq!(loader.state(), &ImageState::Loaded { url });
        assert!(loader.is_terminal());
    }

    #[test]
    fn low_priority_image_shows_placeholder_until_promoted() {
        let mut loader = ImageLoader::new("google:abc", Some(COVER), false, resolver());
        loader.handle(ImageEvent::Start);
        assert_eq!(loader.current_url(), DEFAULT_BOOK_IMAGE);

        // Placeholder outcomes do not drive the ladder.
        loader.handle(ImageEvent::LoadFailed);
        assert!(matches!(loader.state(), ImageState::Deferred { .. }));

        loader.handle(ImageEvent::Promote);
        assert!(matches!(loader.state(), ImageState::Loading { .. }));
        assert_ne!(loader.current_url(), DEFAULT_BOOK_IMAGE);
    }

    #[test]
    fn failing_image_reaches_fallback_pool_after_two_retries() {
        let mut loader = ImageLoader::new("google:abc", Some(COVER), true, resolver());
        loader.handle(ImageEvent::Start);

        let mut seen = vec![loader.current_url().to_string()];
        loader.handle(ImageEvent::LoadFailed);
        assert!(matches!(loader.state(), ImageState::Retrying { attempt: 1, .. }));
        seen.push(loader.current_url().to_string());

        loader.handle(ImageEvent::LoadFailed);
        assert!(matches!(loader.state(), ImageState::Retrying { attempt: 2, .. }));
        seen.push(loader.current_url().to_string());

        loader.handle(ImageEvent::LoadFailed);
        let ImageState::Exhausted { url } = loader.state() else {
            panic!("expected exhausted state, got {:?}", loader.state());
        };
        assert!(FALLBACK_POOL.contains(&url.as_str()));

        seen.dedup();
        assert_eq!(seen.len(), 3, "each attempt should use a different URL");

        // Terminal: further events change nothing.
        loader.handle(ImageEvent::LoadFailed);
        assert!(loader.is_terminal());
    }

    #[test]
    fn missing_cover_still_terminates_in_fallback_pool() {
        let mut loader = ImageLoader::new("openlibrary:OL1W", None, true, resolver());
        loader.handle(ImageEvent::Start);
        assert_eq!(loader.current_url(), DEFAULT_BOOK_IMAGE);
        for _ in 0..3 {
            loader.handle(ImageEvent::LoadFailed);
        }
        assert!(matches!(loader.state(), ImageState::Exhausted { .. }));
    }

    #[test]
    fn completion_callback_fires_once_on_load() {
        let loaded = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&loaded);
        let mut loader = ImageLoader::new("google:abc", Some(COVER), true, resolver())
            .on_loaded(move |url| sink.lock().unwrap().push(url.to_string()));

        loader.handle(ImageEvent::Start);
        loader.handle(ImageEvent::LoadFailed);
        loader.handle(ImageEvent::LoadSucceeded);
        loader.handle(ImageEvent::LoadSucceeded);

        let loaded = loaded.lock().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].contains("cb=t0k3n-r1"));
    }
}
