//! Retrieval and persistence around the reconciliation core
//!
//! Addresses starting with `http://` or `https://` are downloaded; anything
//! else is read from disk. Gzip payloads are detected by their magic bytes.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::epg::{write_document, EpgDocument, EpgParser};
use crate::error::{GrabberError, GrabberResult, InputStage};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_remote(address: &str) -> bool {
    let lower = address.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Raw bytes for an address, from the network or from disk
pub fn fetch(address: &str, stage: InputStage, config: &DownloadConfig) -> GrabberResult<Vec<u8>> {
    if is_remote(address) {
        download(address, config)
    } else {
        fs::read(address).map_err(|e| GrabberError::input(stage, address, e))
    }
}

/// Download with retry support (HTTP and HTTPS)
pub fn download(url: &str, config: &DownloadConfig) -> GrabberResult<Vec<u8>> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(config.read_timeout))
        .timeout_connect(Some(config.connect_timeout))
        .build()
        .new_agent();

    let mut attempts = 0;
    loop {
        attempts += 1;

        match try_download(&agent, url, config) {
            Ok(bytes) => {
                info!("Downloaded {} ({} KB)", url, bytes.len() / 1024);
                return Ok(bytes);
            }
            Err(e) => {
                if attempts >= config.max_retries {
                    return Err(GrabberError::Fetch {
                        address: url.to_string(),
                        message: format!("failed after {} attempts: {}", attempts, e),
                    });
                }
                warn!("Download of {} failed (attempt {}): {}", url, attempts, e);
                std::thread::sleep(config.retry_delay);
            }
        }
    }
}

fn try_download(agent: &ureq::Agent, url: &str, config: &DownloadConfig) -> Result<Vec<u8>, String> {
    let response = agent
        .get(url)
        .header("User-Agent", &config.user_agent)
        .call()
        .map_err(|e| format!("Request failed: {}", e))?;

    let status = response.status();
    if status != 200 {
        return Err(format!("HTTP error: {}", status));
    }

    let mut bytes = Vec::new();
    response
        .into_body()
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| format!("Read failed: {}", e))?;
    Ok(bytes)
}

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

/// Inflate gzip payloads, pass everything else through
pub fn decompress(bytes: Vec<u8>, address: &str) -> GrabberResult<Vec<u8>> {
    if !is_gzip(&bytes) {
        debug!("{} is not compressed, using as is", address);
        return Ok(bytes);
    }

    let mut inflated = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|e| GrabberError::Decompress {
            address: address.to_string(),
            message: e.to_string(),
        })?;
    debug!("{} inflated from {} to {} bytes", address, bytes.len(), inflated.len());
    Ok(inflated)
}

/// Fetch, inflate and parse one guide feed
pub fn load_epg(address: &str, config: &DownloadConfig) -> GrabberResult<EpgDocument> {
    let raw = fetch(address, InputStage::Epg, config)?;
    let xml = decompress(raw, address)?;
    EpgParser::parse_bytes(&xml, address)
}

/// Load every feed on its own thread. Results come back in argument order;
/// the first failure in that order is returned.
pub fn load_epg_feeds(addresses: &[String], config: &DownloadConfig) -> GrabberResult<Vec<EpgDocument>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = addresses
            .iter()
            .map(|address| (address, scope.spawn(move || load_epg(address, config))))
            .collect();

        handles
            .into_iter()
            .map(|(address, handle)| {
                handle.join().unwrap_or_else(|_| {
                    Err(GrabberError::Fetch {
                        address: address.clone(),
                        message: "loader thread panicked".to_string(),
                    })
                })
            })
            .collect()
    })
}

/// Write the document, gzip-compressed if asked. Data goes to a temporary
/// sibling first so a failed run never leaves a partial file at `path`.
/// Returns the size of the written file.
pub fn write_output(doc: &EpgDocument, path: &Path, compress: bool) -> GrabberResult<u64> {
    let display = path.display().to_string();
    let tmp_path = PathBuf::from(format!("{}.tmp", display));

    let result = write_file(doc, &tmp_path, compress)
        .and_then(|()| fs::rename(&tmp_path, path).map_err(|e| GrabberError::write(&display, e)));

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result?;

    let size = fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| GrabberError::write(&display, e))?;
    Ok(size)
}

fn write_file(doc: &EpgDocument, path: &Path, compress: bool) -> GrabberResult<()> {
    let display = path.display().to_string();
    let file = File::create(path).map_err(|e| GrabberError::write(&display, e))?;
    let mut sink = BufWriter::new(file);

    if compress {
        let mut encoder = GzEncoder::new(&mut sink, Compression::default());
        write_document(doc, &mut encoder)?;
        encoder.finish().map_err(|e| GrabberError::write(&display, e))?;
    } else {
        write_document(doc, &mut sink)?;
    }

    sink.flush().map_err(|e| GrabberError::write(&display, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epg::{ChannelEntry, XmlElement};

    const FEED: &str = r#"<?xml version="1.0"?>
<tv>
  <channel id="c1"><display-name>One</display-name></channel>
  <programme start="20250101000000" channel="c1"><title>Show</title></programme>
</tv>"#;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("http://example.com/epg.xml"));
        assert!(is_remote("HTTPS://example.com/epg.xml.gz"));
        assert!(!is_remote("/tmp/epg.xml"));
        assert!(!is_remote("epg.xml"));
    }

    #[test]
    fn test_decompress_detects_gzip() {
        let compressed = gzip(FEED.as_bytes());
        assert!(is_gzip(&compressed));
        assert_eq!(decompress(compressed, "feed").unwrap(), FEED.as_bytes());
    }

    #[test]
    fn test_decompress_passes_plain_through() {
        let plain = FEED.as_bytes().to_vec();
        assert!(!is_gzip(&plain));
        assert_eq!(decompress(plain.clone(), "feed").unwrap(), plain);
    }

    #[test]
    fn test_decompress_corrupt_gzip() {
        let mut broken = gzip(FEED.as_bytes());
        broken.truncate(12);
        assert!(matches!(
            decompress(broken, "feed"),
            Err(GrabberError::Decompress { .. })
        ));
    }

    #[test]
    fn test_missing_local_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("epg.xml");
        let err = fetch(&missing.to_string_lossy(), InputStage::Epg, &DownloadConfig::default()).unwrap_err();
        assert!(matches!(err, GrabberError::Input { stage: InputStage::Epg, .. }));
    }

    #[test]
    fn test_load_feeds_in_argument_order() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.xml");
        let packed = dir.path().join("b.xml.gz");
        fs::write(&plain, FEED).unwrap();
        fs::write(&packed, gzip(FEED.replace("c1", "c2").as_bytes())).unwrap();

        let addresses = vec![
            packed.to_string_lossy().into_owned(),
            plain.to_string_lossy().into_owned(),
        ];
        let docs = load_epg_feeds(&addresses, &DownloadConfig::default()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].channels[0].id, "c2");
        assert_eq!(docs[1].channels[0].id, "c1");
    }

    #[test]
    fn test_load_feeds_fails_on_any_missing() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("a.xml");
        fs::write(&plain, FEED).unwrap();

        let addresses = vec![
            plain.to_string_lossy().into_owned(),
            dir.path().join("missing.xml").to_string_lossy().into_owned(),
        ];
        assert!(matches!(
            load_epg_feeds(&addresses, &DownloadConfig::default()),
            Err(GrabberError::Input { .. })
        ));
    }

    #[test]
    fn test_write_output_gzip_and_plain() {
        let dir = tempfile::tempdir().unwrap();
        let mut doc = EpgDocument::new("out");
        doc.channels.push(ChannelEntry::from_element(
            XmlElement::new("channel").with_attr("id", "c1"),
        ));

        let gz_path = dir.path().join("out.xml.gz");
        let size = write_output(&doc, &gz_path, true).unwrap();
        assert!(size > 0);
        let bytes = fs::read(&gz_path).unwrap();
        assert!(is_gzip(&bytes));
        let xml = String::from_utf8(decompress(bytes, "out").unwrap()).unwrap();
        assert!(xml.contains(r#"<channel id="c1"/>"#));

        let xml_path = dir.path().join("out.xml");
        write_output(&doc, &xml_path, false).unwrap();
        let plain = fs::read_to_string(&xml_path).unwrap();
        assert!(plain.starts_with("<?xml"));
        assert!(!dir.path().join("out.xml.tmp").exists());
    }

    #[test]
    fn test_write_output_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.xml");
        let err = write_output(&EpgDocument::new("out"), &path, false).unwrap_err();
        assert!(matches!(err, GrabberError::Write { .. }));
        assert!(!path.exists());
    }
}
