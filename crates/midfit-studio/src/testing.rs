use std::io::Cursor;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::{ImageFormat, Rgb, RgbImage};
use midfit_contracts::{GeneratedImage, GenerationRequest};

use crate::transport::{Generated, GenerationTransport};

fn encoded(format: ImageFormat) -> Result<Vec<u8>> {
    let image = RgbImage::from_pixel(4, 4, Rgb([200, 120, 40]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format)?;
    Ok(bytes.into_inner())
}

pub(crate) fn png_bytes() -> Result<Vec<u8>> {
    encoded(ImageFormat::Png)
}

pub(crate) fn jpeg_bytes() -> Result<Vec<u8>> {
    encoded(ImageFormat::Jpeg)
}

pub(crate) fn generated(base64: &str) -> Generated {
    Generated {
        image: GeneratedImage {
            base64: base64.to_string(),
            media_type: "image/png".to_string(),
        },
        text: String::new(),
    }
}

/// Transport that blocks each send until the test releases a reply.
pub(crate) struct GatedTransport {
    replies: Mutex<Receiver<Result<Generated>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    served: AtomicUsize,
}

impl GatedTransport {
    pub(crate) fn new() -> (Arc<Self>, Sender<Result<Generated>>) {
        let (tx, rx) = mpsc::channel();
        let transport = Arc::new(Self {
            replies: Mutex::new(rx),
            requests: Mutex::new(Vec::new()),
            served: AtomicUsize::new(0),
        });
        (transport, tx)
    }

    pub(crate) fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Spins until `count` replies have been handed to senders.
    pub(crate) fn await_served(&self, count: usize) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.served.load(Ordering::SeqCst) < count {
            if Instant::now() >= deadline {
                return Err(anyhow!("transport served fewer than {count} replies"));
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }
}

impl GenerationTransport for GatedTransport {
    fn send(&self, request: &GenerationRequest) -> Result<Generated> {
        self.requests
            .lock()
            .map_err(|_| anyhow!("requests lock poisoned"))?
            .push(request.clone());
        let replies = self
            .replies
            .lock()
            .map_err(|_| anyhow!("replies lock poisoned"))?;
        let reply = replies.recv().map_err(|_| anyhow!("gate closed"))?;
        self.served.fetch_add(1, Ordering::SeqCst);
        reply
    }
}
