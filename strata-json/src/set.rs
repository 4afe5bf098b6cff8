//! JSON-Schema document sets.
//!
//! A [`SchemaSet`] loads a group of JSON-Schema documents through a
//! caller-supplied blob loader, following `$ref`s across documents
//! until the set is closed. Locations inside the set are addressed by a
//! [`SchemaHandle`]: a document URL plus a JSON Pointer fragment.
//!
//! `$id` rebasing is not supported; references resolve against the
//! document URL they appear in.

use std::collections::BTreeMap;

use jsonptr::{PointerBuf, Resolve};
use serde_json::Value;
use url::Url;

use strata_core::error::{Error, Result};

/// Supplies raw document bytes by URL or path.
pub trait BlobLoader {
    fn load_blob(&self, url: &str) -> Result<Vec<u8>>;
}

impl<F> BlobLoader for F
where
    F: Fn(&str) -> Result<Vec<u8>>,
{
    fn load_blob(&self, url: &str) -> Result<Vec<u8>> {
        self(url)
    }
}

/// A location inside a schema set: document URL plus pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaHandle {
    pub url: Url,
    pub pointer: PointerBuf,
}

impl SchemaHandle {
    /// Human-readable location for error messages.
    pub fn location(&self) -> String {
        if self.pointer.is_root() {
            self.url.to_string()
        } else {
            format!("{}#{}", self.url, self.pointer)
        }
    }
}

/// Turns a reference string into an absolute URL. Bare paths get the
/// `file:` scheme so they can serve as keys and join bases.
fn to_url(reference: &str) -> Result<Url> {
    match Url::parse(reference) {
        Ok(url) => Ok(url),
        Err(_) => Url::parse(&format!("file:{reference}"))
            .map_err(|e| Error::InvalidSchema(format!("bad schema reference {reference}: {e}"))),
    }
}

/// The loader key for a URL: `file:` URLs go back to plain paths.
fn loader_key(url: &Url) -> String {
    if url.scheme() == "file" {
        url.path().to_string()
    } else {
        url.to_string()
    }
}

fn split_fragment(mut url: Url) -> Result<SchemaHandle> {
    let fragment = url.fragment().unwrap_or("").to_string();
    url.set_fragment(None);
    let pointer = if fragment.is_empty() {
        PointerBuf::default()
    } else {
        PointerBuf::parse(fragment.as_str()).map_err(|e| {
            Error::InvalidSchema(format!("unsupported $ref fragment \"{fragment}\": {e}"))
        })?
    };
    Ok(SchemaHandle { url, pointer })
}

/// A closed set of loaded JSON-Schema documents keyed by URL.
#[derive(Debug, Default)]
pub struct SchemaSet {
    docs: BTreeMap<Url, Value>,
}

impl SchemaSet {
    /// Loads the documents the root references name, then keeps loading
    /// whatever their `$ref`s point at until the set is closed.
    pub fn compile<L, I>(loader: &L, roots: I) -> Result<SchemaSet>
    where
        L: BlobLoader,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut set = SchemaSet::default();
        let mut queue: Vec<Url> = Vec::new();
        for root in roots {
            queue.push(split_fragment(to_url(root.as_ref())?)?.url);
        }
        while let Some(url) = queue.pop() {
            if set.docs.contains_key(&url) {
                continue;
            }
            let bytes = loader.load_blob(&loader_key(&url))?;
            let value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| Error::InvalidSchema(format!("bad JSON schema at {url}: {e}")))?;
            scan_refs(&value, &url, &mut queue);
            set.docs.insert(url, value);
        }
        Ok(set)
    }

    /// Resolves a reference string against a base document.
    pub fn handle(&self, base: &Url, reference: &str) -> Result<SchemaHandle> {
        let joined = base
            .join(reference)
            .map_err(|e| Error::InvalidSchema(format!("bad $ref {reference}: {e}")))?;
        split_fragment(joined)
    }

    /// Resolves a top-level reference string (no base).
    pub fn root_handle(&self, reference: &str) -> Result<SchemaHandle> {
        split_fragment(to_url(reference)?)
    }

    /// The schema value at a handle.
    pub fn value(&self, handle: &SchemaHandle) -> Result<&Value> {
        let doc = self
            .docs
            .get(&handle.url)
            .ok_or_else(|| Error::NotFound(handle.location()))?;
        doc.resolve(&handle.pointer)
            .map_err(|_| Error::NotFound(handle.location()))
    }
}

/// Queues the document URL of every `$ref` in the value.
fn scan_refs(value: &Value, base: &Url, queue: &mut Vec<Url>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                if let Ok(mut url) = base.join(reference) {
                    url.set_fragment(None);
                    queue.push(url);
                }
            }
            for child in map.values() {
                scan_refs(child, base, queue);
            }
        }
        Value::Array(items) => {
            for child in items {
                scan_refs(child, base, queue);
            }
        }
        _ => {}
    }
}
