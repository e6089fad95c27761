//! Image encoding: [`Screenshot`] → base64 `ImageData` for the VLM request.
//!
//! Screenshots are forwarded in their original format. Re-encoding to PNG
//! would only grow JPEG screenshots without adding detail the model can use.
//! `detail: "high"` lets GPT-4-class models tile the image instead of
//! reading a single 512 px overview, which matters for small slide text.

use crate::pipeline::input::Screenshot;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Encode a screenshot as a base64 image attachment.
pub fn encode_screenshot(shot: &Screenshot) -> ImageData {
    let b64 = STANDARD.encode(&shot.bytes);
    debug!(
        "Encoded {} screenshot → {} bytes base64",
        shot.mime_type,
        b64.len()
    );
    ImageData::new(b64, shot.mime_type.clone()).with_detail("high")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_keeps_mime_and_bytes() {
        let shot = Screenshot::new(b"\x89PNG\r\n\x1a\nrest".to_vec(), "image/png");
        let data = encode_screenshot(&shot);
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(decoded, shot.bytes.to_vec());
    }
}
