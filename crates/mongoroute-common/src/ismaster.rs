use bson::{Bson, Document};

/// The fields of an ismaster reply the topology manager actually reads.
///
/// A mongos identifies itself with `msg: "isdbgrid"`; replica-set fields such
/// as `arbiterOnly` matter only when deciding which members of the connected
/// set participate in an authentication fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct IsMaster {
    pub ok: bool,
    pub ismaster: bool,
    pub msg: String,
    pub arbiter_only: bool,
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    /// The full reply as received, for callers that need more than the
    /// projected fields.
    pub raw: Document,
}

impl IsMaster {
    /// Parses an ismaster reply document from the server.
    pub fn from_document(doc: Document) -> IsMaster {
        let mut result = IsMaster {
            ok: false,
            ismaster: false,
            msg: String::new(),
            arbiter_only: false,
            min_wire_version: 0,
            max_wire_version: 0,
            raw: Document::new(),
        };

        match doc.get("ok") {
            Some(&Bson::Double(v)) => result.ok = v == 1.0,
            Some(&Bson::Int32(v)) => result.ok = v == 1,
            Some(&Bson::Int64(v)) => result.ok = v == 1,
            _ => {}
        }

        if let Some(&Bson::Boolean(b)) = doc.get("ismaster") {
            result.ismaster = b;
        }

        if let Some(Bson::String(s)) = doc.get("msg") {
            result.msg = s.clone();
        }

        if let Some(&Bson::Boolean(b)) = doc.get("arbiterOnly") {
            result.arbiter_only = b;
        }

        if let Some(&Bson::Int32(v)) = doc.get("minWireVersion") {
            result.min_wire_version = v;
        }

        if let Some(&Bson::Int32(v)) = doc.get("maxWireVersion") {
            result.max_wire_version = v;
        }

        result.raw = doc;
        result
    }

    /// Whether the reply came from a shard router.
    pub fn is_mongos(&self) -> bool {
        self.msg == "isdbgrid"
    }
}
