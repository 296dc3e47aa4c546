use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Text encodings meter exports show up in, tried in configured order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceEncoding {
    #[serde(rename = "utf-8-sig", alias = "utf-8", alias = "utf8")]
    Utf8Sig,
    #[serde(rename = "cp1252", alias = "windows-1252")]
    Windows1252,
    #[serde(rename = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl SourceEncoding {
    pub const DEFAULT_ORDER: [SourceEncoding; 3] = [Self::Utf8Sig, Self::Windows1252, Self::Latin1];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Utf8Sig => "utf-8-sig",
            Self::Windows1252 => "cp1252",
            Self::Latin1 => "latin1",
        }
    }

    /// Strict decode; `None` when the bytes are not valid in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Self::Utf8Sig => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                encoding_rs::UTF_8
                    .decode_without_bom_handling_and_without_replacement(body)
                    .map(|text| text.into_owned())
            }
            Self::Windows1252 => encoding_rs::WINDOWS_1252
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| text.into_owned()),
            Self::Latin1 => Some(encoding_rs::mem::decode_latin1(bytes).into_owned()),
        }
    }
}
