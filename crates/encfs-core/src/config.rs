//! The `.encfs6.xml` sidecar: parsing, emission, and the in-memory
//! [`VolumeConfig`] it round-trips through.

use base64::Engine as _;
use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{EncfsError, Result};

/// Content (file data) cipher mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentAlgorithm {
    Cfb,
    Cbc,
}

impl ContentAlgorithm {
    fn xml_name(self) -> &'static str {
        match self {
            ContentAlgorithm::Cfb => "ssl/aes-cfb",
            ContentAlgorithm::Cbc => "ssl/aes-cbc",
        }
    }

    fn from_xml_name(name: &str) -> Result<Self> {
        match name {
            "ssl/aes-cfb" => Ok(ContentAlgorithm::Cfb),
            "ssl/aes-cbc" => Ok(ContentAlgorithm::Cbc),
            other => Err(EncfsError::unsupported("cipher algorithm", other)),
        }
    }
}

/// Filename codec variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameAlgorithm {
    Stream,
    Block,
    Null,
}

impl NameAlgorithm {
    fn xml_name(self) -> &'static str {
        match self {
            NameAlgorithm::Stream => "nameio/stream",
            NameAlgorithm::Block => "nameio/block",
            NameAlgorithm::Null => "nameio/null",
        }
    }

    fn from_xml_name(name: &str) -> Result<Self> {
        match name {
            "nameio/stream" => Ok(NameAlgorithm::Stream),
            "nameio/block" => Ok(NameAlgorithm::Block),
            "nameio/null" => Ok(NameAlgorithm::Null),
            other => Err(EncfsError::unsupported("filename algorithm", other)),
        }
    }
}

/// Immutable, parsed (or freshly constructed) volume configuration.
///
/// Construction and parsing both reject `external_iv_chaining = true`: the
/// flag is rejected at the boundary and never threaded into any codec, per
/// the "preserve the reject; do not infer semantics" design note.
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    pub creator: String,
    pub content_algorithm: ContentAlgorithm,
    pub name_algorithm: NameAlgorithm,
    pub key_size_bits: u32,
    pub block_size: u32,
    pub unique_iv: bool,
    pub chained_name_iv: bool,
    pub allow_holes: bool,
    pub block_mac_bytes: u8,
    pub block_mac_rand_bytes: u8,
    pub kdf_iterations: u32,
    pub salt: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

pub const CONFIG_FILE_NAME: &str = ".encfs6.xml";

impl VolumeConfig {
    /// Construct a new config, validating invariants. `external_iv_chaining`
    /// is accepted as a parameter purely so callers can observe the
    /// rejection; there is no way to construct a config with it set.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        creator: impl Into<String>,
        content_algorithm: ContentAlgorithm,
        name_algorithm: NameAlgorithm,
        key_size_bits: u32,
        block_size: u32,
        unique_iv: bool,
        chained_name_iv: bool,
        allow_holes: bool,
        external_iv_chaining: bool,
        block_mac_bytes: u8,
        block_mac_rand_bytes: u8,
        kdf_iterations: u32,
        salt: Vec<u8>,
        wrapped_key: Vec<u8>,
    ) -> Result<Self> {
        if external_iv_chaining {
            return Err(EncfsError::unsupported("flag", "externalIVChaining"));
        }
        if !matches!(key_size_bits, 128 | 192 | 256) {
            return Err(EncfsError::invalid_config("keySize", "must be 128, 192, or 256"));
        }
        if block_size < 16 || block_size % 16 != 0 {
            return Err(EncfsError::invalid_config(
                "blockSize",
                "must be >= 16 and a multiple of the cipher block size",
            ));
        }
        if block_mac_bytes > 8 || block_mac_rand_bytes > 8 {
            return Err(EncfsError::invalid_config("blockMACBytes", "must be 0..=8"));
        }
        Ok(VolumeConfig {
            creator: creator.into(),
            content_algorithm,
            name_algorithm,
            key_size_bits,
            block_size,
            unique_iv,
            chained_name_iv,
            allow_holes,
            block_mac_bytes,
            block_mac_rand_bytes,
            kdf_iterations,
            salt,
            wrapped_key,
        })
    }

    /// The default creation config specified in the external interfaces
    /// section: AES-CBC content, block filenames, 192-bit key, 1024-byte
    /// blocks, `uniqueIV`/`chainedNameIV`/`allowHoles` on, 5000 PBKDF2
    /// iterations, no block MAC.
    pub fn default_for_creation(salt: Vec<u8>, wrapped_key: Vec<u8>) -> Result<Self> {
        Self::new(
            "encfs-rs",
            ContentAlgorithm::Cbc,
            NameAlgorithm::Block,
            192,
            1024,
            true,
            true,
            true,
            false,
            0,
            0,
            5000,
            salt,
            wrapped_key,
        )
    }

    /// Parse a `.encfs6.xml` document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| EncfsError::invalid_config("(document)", "not valid UTF-8"))?;
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut fields = XmlFields::default();
        let mut current_tag: Vec<String> = Vec::new();
        let mut buf = Vec::new();
        loop {
            match reader
                .read_event_into(&mut buf)
                .map_err(|e| EncfsError::invalid_config("(document)", e.to_string()))?
            {
                Event::Start(e) => {
                    current_tag.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                Event::End(_) => {
                    current_tag.pop();
                }
                Event::Text(t) => {
                    if let Some(tag) = current_tag.last() {
                        let value = t
                            .unescape()
                            .map_err(|e| EncfsError::invalid_config("(document)", e.to_string()))?
                            .into_owned();
                        fields.set(tag, value);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        fields.into_config()
    }

    /// Emit the config as a `.encfs6.xml` document, in the tag order fixed
    /// by the external interfaces section.
    pub fn write(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

        write_elem(&mut writer, "version", "20")?;
        write_elem(&mut writer, "creator", &self.creator)?;

        writer
            .create_element("cipherAlg")
            .write_inner_content::<_, quick_xml::Error>(|w| {
                write_elem(w, "name", self.content_algorithm.xml_name())?;
                write_elem(w, "major", "3")?;
                write_elem(w, "minor", "0")?;
                Ok(())
            })
            .map_err(xml_write_err)?;

        writer
            .create_element("nameAlg")
            .write_inner_content::<_, quick_xml::Error>(|w| {
                write_elem(w, "name", self.name_algorithm.xml_name())?;
                write_elem(w, "major", "3")?;
                write_elem(w, "minor", "0")?;
                Ok(())
            })
            .map_err(xml_write_err)?;

        write_elem(&mut writer, "keySize", &self.key_size_bits.to_string())?;
        write_elem(&mut writer, "blockSize", &self.block_size.to_string())?;
        write_elem(&mut writer, "uniqueIV", bool_str(self.unique_iv))?;
        write_elem(&mut writer, "chainedNameIV", bool_str(self.chained_name_iv))?;
        write_elem(&mut writer, "externalIVChaining", "0")?;
        write_elem(&mut writer, "blockMACBytes", &self.block_mac_bytes.to_string())?;
        write_elem(
            &mut writer,
            "blockMACRandBytes",
            &self.block_mac_rand_bytes.to_string(),
        )?;
        write_elem(&mut writer, "allowHoles", bool_str(self.allow_holes))?;

        let encoded_key = base64::engine::general_purpose::STANDARD.encode(&self.wrapped_key);
        write_elem(&mut writer, "encodedKeySize", &self.wrapped_key.len().to_string())?;
        write_elem(&mut writer, "encodedKeyData", &encoded_key)?;

        let encoded_salt = base64::engine::general_purpose::STANDARD.encode(&self.salt);
        write_elem(&mut writer, "saltLen", &self.salt.len().to_string())?;
        write_elem(&mut writer, "saltData", &encoded_salt)?;

        write_elem(&mut writer, "kdfIterations", &self.kdf_iterations.to_string())?;
        write_elem(&mut writer, "desiredKDFDuration", "500")?;

        Ok(writer.into_inner())
    }
}

fn bool_str(b: bool) -> &'static str {
    if b { "1" } else { "0" }
}

fn xml_write_err(e: quick_xml::Error) -> EncfsError {
    EncfsError::invalid_config("(document)", e.to_string())
}

fn write_elem(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))
        .map_err(xml_write_err)?;
    Ok(())
}

/// Scratch accumulator for the flat tag->text map gathered while parsing;
/// `cipherAlg`/`nameAlg` are disambiguated by the caller reading the `name`
/// field immediately after seeing the enclosing tag, so we track the last
/// `name`/`major`/`minor` seen for each of those two groups separately via
/// prefixed keys.
#[derive(Default)]
struct XmlFields {
    creator: Option<String>,
    cipher_name: Option<String>,
    name_alg_name: Option<String>,
    key_size: Option<u32>,
    block_size: Option<u32>,
    unique_iv: Option<bool>,
    chained_name_iv: Option<bool>,
    external_iv_chaining: Option<bool>,
    block_mac_bytes: Option<u8>,
    block_mac_rand_bytes: Option<u8>,
    allow_holes: Option<bool>,
    encoded_key_data: Option<String>,
    salt_data: Option<String>,
    kdf_iterations: Option<u32>,
    // Which group ("cipherAlg" or "nameAlg") the next bare `name` belongs to
    // is tracked implicitly: encfs6.xml never nests one inside the other, so
    // the first `name` text seen after parse start (in document order)
    // belongs to cipherAlg, the second to nameAlg. We approximate this with
    // a simple counter.
    name_tags_seen: u8,
}

impl XmlFields {
    fn set(&mut self, tag: &str, value: String) {
        match tag {
            "creator" => self.creator = Some(value),
            "name" => {
                self.name_tags_seen += 1;
                if self.name_tags_seen == 1 {
                    self.cipher_name = Some(value);
                } else {
                    self.name_alg_name = Some(value);
                }
            }
            "keySize" => self.key_size = value.parse().ok(),
            "blockSize" => self.block_size = value.parse().ok(),
            "uniqueIV" => self.unique_iv = Some(value == "1"),
            "chainedNameIV" => self.chained_name_iv = Some(value == "1"),
            "externalIVChaining" => self.external_iv_chaining = Some(value == "1"),
            "blockMACBytes" => self.block_mac_bytes = value.parse().ok(),
            "blockMACRandBytes" => self.block_mac_rand_bytes = value.parse().ok(),
            "allowHoles" => self.allow_holes = Some(value == "1"),
            "encodedKeyData" => self.encoded_key_data = Some(value),
            "saltData" => self.salt_data = Some(value),
            "kdfIterations" => self.kdf_iterations = value.parse().ok(),
            _ => {}
        }
    }

    fn into_config(self) -> Result<VolumeConfig> {
        let missing = |field: &'static str| EncfsError::invalid_config(field, "missing from config");

        let content_algorithm =
            ContentAlgorithm::from_xml_name(self.cipher_name.as_deref().ok_or_else(|| missing("cipherAlg/name"))?)?;
        let name_algorithm =
            NameAlgorithm::from_xml_name(self.name_alg_name.as_deref().ok_or_else(|| missing("nameAlg/name"))?)?;

        if self.external_iv_chaining.unwrap_or(false) {
            return Err(EncfsError::unsupported("flag", "externalIVChaining"));
        }

        let encoded_key_data = self.encoded_key_data.ok_or_else(|| missing("encodedKeyData"))?;
        let wrapped_key = base64::engine::general_purpose::STANDARD
            .decode(encoded_key_data)
            .map_err(|e| EncfsError::invalid_config("encodedKeyData", e.to_string()))?;

        let salt_data = self.salt_data.ok_or_else(|| missing("saltData"))?;
        let salt = base64::engine::general_purpose::STANDARD
            .decode(salt_data)
            .map_err(|e| EncfsError::invalid_config("saltData", e.to_string()))?;

        VolumeConfig::new(
            self.creator.unwrap_or_else(|| "unknown".to_string()),
            content_algorithm,
            name_algorithm,
            self.key_size.ok_or_else(|| missing("keySize"))?,
            self.block_size.ok_or_else(|| missing("blockSize"))?,
            self.unique_iv.unwrap_or(false),
            self.chained_name_iv.unwrap_or(false),
            self.allow_holes.unwrap_or(false),
            false,
            self.block_mac_bytes.unwrap_or(0),
            self.block_mac_rand_bytes.unwrap_or(0),
            self.kdf_iterations.ok_or_else(|| missing("kdfIterations"))?,
            salt,
            wrapped_key,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> VolumeConfig {
        VolumeConfig::default_for_creation(vec![1, 2, 3, 4, 5, 6, 7, 8], vec![9; 44]).unwrap()
    }

    /// Invariant 4: `parse(write(config))` equals `config` field-wise.
    #[test]
    fn config_roundtrip() {
        let config = sample_config();
        let bytes = config.write().unwrap();
        let parsed = VolumeConfig::parse(&bytes).unwrap();

        assert_eq!(parsed.creator, config.creator);
        assert_eq!(parsed.content_algorithm, config.content_algorithm);
        assert_eq!(parsed.name_algorithm, config.name_algorithm);
        assert_eq!(parsed.key_size_bits, config.key_size_bits);
        assert_eq!(parsed.block_size, config.block_size);
        assert_eq!(parsed.unique_iv, config.unique_iv);
        assert_eq!(parsed.chained_name_iv, config.chained_name_iv);
        assert_eq!(parsed.allow_holes, config.allow_holes);
        assert_eq!(parsed.block_mac_bytes, config.block_mac_bytes);
        assert_eq!(parsed.block_mac_rand_bytes, config.block_mac_rand_bytes);
        assert_eq!(parsed.kdf_iterations, config.kdf_iterations);
        assert_eq!(parsed.salt, config.salt);
        assert_eq!(parsed.wrapped_key, config.wrapped_key);
    }

    #[test]
    fn rejects_external_iv_chaining() {
        let result = VolumeConfig::new(
            "t",
            ContentAlgorithm::Cbc,
            NameAlgorithm::Block,
            192,
            1024,
            true,
            true,
            true,
            true,
            0,
            0,
            5000,
            vec![0; 8],
            vec![0; 44],
        );
        assert!(matches!(result, Err(EncfsError::Unsupported { .. })));
    }

    #[test]
    fn rejects_bad_key_size() {
        let result = VolumeConfig::new(
            "t",
            ContentAlgorithm::Cbc,
            NameAlgorithm::Block,
            200,
            1024,
            true,
            true,
            true,
            false,
            0,
            0,
            5000,
            vec![0; 8],
            vec![0; 44],
        );
        assert!(matches!(result, Err(EncfsError::InvalidConfig { .. })));
    }

    #[test]
    fn rejects_external_iv_chaining_on_parse() {
        let mut config = sample_config();
        config.wrapped_key = vec![9; 44];
        let mut bytes = String::from_utf8(config.write().unwrap()).unwrap();
        bytes = bytes.replace("<externalIVChaining>0</externalIVChaining>", "<externalIVChaining>1</externalIVChaining>");
        let result = VolumeConfig::parse(bytes.as_bytes());
        assert!(matches!(result, Err(EncfsError::Unsupported { .. })));
    }
}
