use std::fs::{self, File};
use std::path::PathBuf;

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ImageConfig, DEFAULT_USER_AGENT};

const NAME_STEM_CAP: usize = 50;
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("http error for {url}: {reason}")]
    Http { url: String, reason: String },
    #[error("non-success status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Streams resolved images into the local image directory.
pub struct ImageDownloader {
    client: Client,
    dir: PathBuf,
    public_prefix: String,
}

impl ImageDownloader {
    pub fn new(config: &ImageConfig) -> Result<Self, ImageError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|err| ImageError::Http {
                url: String::new(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            client,
            dir: config.dir.clone(),
            public_prefix: config.public_prefix.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the root-relative path the stored event should reference.
    pub fn download(&self, event_name: &str, url: &str) -> Result<String, ImageError> {
        fs::create_dir_all(&self.dir)?;
        let file_name = artifact_name(event_name, url);
        let path = self.dir.join(&file_name);

        let mut response = self.client.get(url).send().map_err(|err| ImageError::Http {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = File::create(&path)?;
        if let Err(err) = response.copy_to(&mut file) {
            drop(file);
            if let Err(remove_err) = fs::remove_file(&path) {
                warn!(path = %path.display(), error = %remove_err, "failed to remove partial image");
            }
            return Err(ImageError::Http {
                url: url.to_string(),
                reason: err.to_string(),
            });
        }

        info!(url, path = %path.display(), "downloaded image");
        Ok(format!("{}/{}", self.public_prefix, file_name))
    }
}

/// `<sanitized-name>_<8-hex-id>.<ext>`; the id hashes the URL so reruns reuse the same name.
pub fn artifact_name(event_name: &str, url: &str) -> String {
    let stem: String = event_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .take(NAME_STEM_CAP)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    format!("{stem}_{}.{}", &digest[..8], extension_for(url))
}

fn extension_for(url: &str) -> String {
    let path = reqwest::Url::parse(url)
        .map(|parsed| parsed.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or_default().to_string());
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((_, ext))
            if (1..=4).contains(&ext.len()) && ext.chars().all(|ch| ch.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod test_server {
    //! One-shot HTTP server for download tests.

    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Answers exactly one request with `response`, returning the base URL.
    pub fn serve_once(response: &'static [u8]) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 2048];
            let mut request = Vec::new();
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let read = stream.read(&mut buf).expect("read request");
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            stream.write_all(response).expect("write response");
        });
        (format!("http://{addr}"), handle)
    }
}

#[cfg(test)]
mod tests {
    use super::test_server::serve_once;
    use super::*;

    fn config_in(dir: &std::path::Path) -> ImageConfig {
        ImageConfig {
            download: true,
            dir: dir.to_path_buf(),
            ..ImageConfig::default()
        }
    }

    #[test]
    fn artifact_names_are_sanitized_and_stable() {
        let name = artifact_name("Jazz @ The Rocks: Live!", "https://cdn.example/a/b/Cover.PNG?w=400");
        assert!(name.starts_with("Jazz___The_Rocks__Live__"));
        assert!(name.ends_with(".png"));
        let id = name.trim_end_matches(".png").rsplit('_').next().unwrap();
        assert_eq!(id.len(), 8);
        assert_eq!(
            name,
            artifact_name("Jazz @ The Rocks: Live!", "https://cdn.example/a/b/Cover.PNG?w=400")
        );
    }

    #[test]
    fn odd_extensions_fall_back_to_default() {
        assert!(artifact_name("x", "https://cdn.example/image").ends_with(".jpg"));
        assert!(artifact_name("x", "https://cdn.example/image.verylong").ends_with(".jpg"));
        assert!(artifact_name("x", "https://cdn.example/image.we%20b").ends_with(".jpg"));
        assert!(artifact_name("x", "https://cdn.example/image.webp").ends_with(".webp"));
    }

    #[test]
    fn long_names_are_capped() {
        let name = artifact_name(&"a".repeat(120), "https://cdn.example/p.jpg");
        assert_eq!(name.len(), NAME_STEM_CAP + 1 + 8 + 4);
    }

    #[test]
    fn downloads_into_image_dir() {
        let (base, server) = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4\r\nConnection: close\r\n\r\nPNG!",
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = ImageDownloader::new(&config_in(dir.path())).expect("client");
        let url = format!("{base}/pic.png");

        let stored = downloader.download("Opera Night", &url).expect("download");
        server.join().expect("server thread");

        let file_name = artifact_name("Opera Night", &url);
        assert_eq!(stored, format!("/static/images/{file_name}"));
        let bytes = fs::read(dir.path().join(&file_name)).expect("image written");
        assert_eq!(bytes, b"PNG!");
    }

    #[test]
    fn error_status_is_reported() {
        let (base, server) = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let downloader = ImageDownloader::new(&config_in(dir.path())).expect("client");
        let result = downloader.download("Missing", &format!("{base}/gone.jpg"));
        server.join().expect("server thread");

        assert!(matches!(result, Err(ImageError::Status { status: 404, .. })));
        assert_eq!(fs::read_dir(dir.path()).expect("read dir").count(), 0);
    }
}
