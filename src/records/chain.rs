//! Hash-linked, signed log records.

use crate::crypto::{verify_signature, EncryptionKey, Identity};
use crate::dag::Node;
use crate::error::{Result, ServiceError};
use crate::types::{Cid, LogId, ThreadId, Timestamp};
use serde::{Deserialize, Serialize};

/// Encoded form of a record as stored in the DAG.
#[derive(Serialize, Deserialize)]
struct RecordNode {
    prev: Option<Cid>,
    time: Timestamp,
    body: Vec<u8>,
    sig: Vec<u8>,
}

/// Bytes covered by a record's signature.
#[derive(Serialize)]
struct SignedFields<'a> {
    thread: &'a ThreadId,
    prev: &'a Option<Cid>,
    time: Timestamp,
    body: &'a [u8],
}

/// One entry in a log's chain.
///
/// `cid` is the identity the record claims; [`LogRecord::verify`] checks it
/// against the encoded content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    pub cid: Cid,
    /// Previous record in the same log, `None` for the root.
    pub prev: Option<Cid>,
    pub time: Timestamp,
    /// Sealed body (`nonce || ciphertext`).
    pub body: Vec<u8>,
    /// Signature by the log key.
    pub sig: Vec<u8>,
}

impl LogRecord {
    /// Seal `plaintext` and sign a new record linked to `prev`.
    pub fn create(
        thread: &ThreadId,
        author: &Identity,
        prev: Option<Cid>,
        time: Timestamp,
        plaintext: &[u8],
        key: &EncryptionKey,
    ) -> Result<Self> {
        let body = key.encrypt(plaintext)?;
        let sig = author.sign(&signed_bytes(thread, &prev, time, &body)?).to_vec();

        let mut record = Self {
            cid: Cid::of(&[]),
            prev,
            time,
            body,
            sig,
        };
        record.cid = record.content_cid()?;
        Ok(record)
    }

    /// Decode a record from a DAG node.
    pub fn from_node(node: &Node) -> Result<Self> {
        let decoded: RecordNode = rmp_serde::from_slice(node.data()).map_err(|e| {
            ServiceError::InvalidRecord(format!("block {} is not a record: {e}", node.cid()))
        })?;
        Ok(Self {
            cid: node.cid(),
            prev: decoded.prev,
            time: decoded.time,
            body: decoded.body,
            sig: decoded.sig,
        })
    }

    /// Encode into a DAG node. The node's cid is computed from content.
    pub fn to_node(&self) -> Result<Node> {
        Ok(Node::new(self.encode()?))
    }

    /// Identifier derived from the record's content.
    pub fn content_cid(&self) -> Result<Cid> {
        Ok(Cid::of(&self.encode()?))
    }

    /// Check that the content hash matches `cid` and that the signature was
    /// made by `log` for `thread`.
    pub fn verify(&self, thread: &ThreadId, log: &LogId) -> Result<()> {
        let computed = self.content_cid()?;
        if computed != self.cid {
            return Err(ServiceError::InvalidRecord(format!(
                "content hash {} does not match claimed cid {}",
                computed, self.cid
            )));
        }

        let signed = signed_bytes(thread, &self.prev, self.time, &self.body)?;
        verify_signature(log, &signed, &self.sig)
    }

    /// Open the body.
    pub fn decrypt(&self, key: &EncryptionKey) -> Result<Vec<u8>> {
        key.decrypt(&self.body)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let node = RecordNode {
            prev: self.prev,
            time: self.time,
            body: self.body.clone(),
            sig: self.sig.clone(),
        };
        Ok(rmp_serde::to_vec(&node)?)
    }
}

fn signed_bytes(
    thread: &ThreadId,
    prev: &Option<Cid>,
    time: Timestamp,
    body: &[u8],
) -> Result<Vec<u8>> {
    let fields = SignedFields {
        thread,
        prev,
        time,
        body,
    };
    Ok(rmp_serde::to_vec(&fields)?)
}
