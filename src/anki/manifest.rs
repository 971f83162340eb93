use std::collections::BTreeMap;

use tracing::{
    debug,
    warn,
};

use super::decompress::decompress;

/// Zip entry name -> real media filename.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaManifest {
    entries: BTreeMap<String, String>,
}

impl MediaManifest {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    fn filename(&self, entry: &str) -> Option<&str> {
        self.entries.get(entry).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(entry, name)| (entry.as_str(), name.as_str()))
    }

    /// Legacy packages store plain JSON, newer ones a compressed JSON map or
    /// a compressed protobuf `MediaEntries` message.
    pub fn parse(raw: &[u8]) -> Self {
        if let Some(manifest) = Self::parse_json(raw) {
            debug!("Loaded media manifest (legacy format): {} files", manifest.len());
            return manifest;
        }

        let decompressed = decompress(raw);
        if let Some(manifest) = Self::parse_json(&decompressed) {
            debug!("Loaded media manifest (compressed json): {} files", manifest.len());
            return manifest;
        }

        match parse_media_entries(&decompressed) {
            Some(manifest) => {
                debug!("Loaded media manifest (protobuf): {} files", manifest.len());
                manifest
            }
            None => {
                warn!("Could not parse media manifest, skipping media");
                Self::default()
            }
        }
    }

    fn parse_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice::<BTreeMap<String, String>>(data).ok().map(Self::new)
    }
}

struct ProtoReader<'a> {
    data: &'a [u8],
    pos: usize,
}

enum ProtoValue<'a> {
    Varint(u64),
    Bytes(&'a [u8]),
    Skipped,
}

impl<'a> ProtoReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn varint(&mut self) -> Option<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Some(value);
            }
        }
        None
    }

    fn take(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn field(&mut self) -> Option<(u64, ProtoValue<'a>)> {
        let key = self.varint()?;
        let number = key >> 3;
        let value = match key & 0x07 {
            0 => ProtoValue::Varint(self.varint()?),
            1 => {
                self.take(8)?;
                ProtoValue::Skipped
            }
            2 => {
                let len = usize::try_from(self.varint()?).ok()?;
                ProtoValue::Bytes(self.take(len)?)
            }
            5 => {
                self.take(4)?;
                ProtoValue::Skipped
            }
            _ => return None,
        };
        Some((number, value))
    }
}

// message MediaEntries { repeated MediaEntry entries = 1; }
// message MediaEntry { string name = 1; uint32 size = 2; bytes sha1 = 3; optional uint32 legacy_zip_filename = 255; }
fn parse_media_entries(data: &[u8]) -> Option<MediaManifest> {
    let mut reader = ProtoReader::new(data);
    let mut entries = BTreeMap::new();
    let mut index = 0usize;

    while !reader.is_done() {
        let (number, value) = reader.field()?;
        let (1, ProtoValue::Bytes(entry)) = (number, value) else {
            continue;
        };

        let mut entry_reader = ProtoReader::new(entry);
        let mut name = None;
        let mut legacy_zip_filename = None;
        while !entry_reader.is_done() {
            match entry_reader.field()? {
                (1, ProtoValue::Bytes(bytes)) => {
                    name = Some(String::from_utf8(bytes.to_vec()).ok()?);
                }
                (255, ProtoValue::Varint(legacy)) => legacy_zip_filename = Some(legacy),
                _ => {}
            }
        }

        if let Some(name) = name {
            let zip_name = legacy_zip_filename.map_or_else(|| index.to_string(), |n| n.to_string());
            entries.insert(zip_name, name);
        }
        index += 1;
    }

    if entries.is_empty() && !data.is_empty() {
        return None;
    }
    Some(MediaManifest::new(entries))
}

#[cfg(test)]
fn encode_media_entries(names: &[&str]) -> Vec<u8> {
    let mut out = Vec::new();
    for name in names {
        let mut entry = vec![0x0A, name.len() as u8];
        entry.extend_from_slice(name.as_bytes());
        entry.extend_from_slice(&[0x10, 0x03]); // size = 3
        out.push(0x0A);
        out.push(entry.len() as u8);
        out.extend_from_slice(&entry);
    }
    out
}
