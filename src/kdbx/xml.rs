//! The XML document inside a KDBX payload.
//!
//! Parsing goes through a small owned DOM ([`Node`]) so protected values can
//! be assigned their keystream offsets in document order before the tree is
//! converted into groups and entries.

use std::fmt::Display;
use std::io;

use chrono::{DateTime, TimeZone, Utc};
use data_encoding::BASE64;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use zeroize::Zeroizing;

use super::crypto::InnerStream;
use super::{corrupt, new_uuid, Entry, Field, Group, Meta, Protected, Times, Value};
use crate::error::KpassError;
use crate::Result;

/// Seconds between 0001-01-01T00:00:00Z and the Unix epoch.
const KDBX_EPOCH_OFFSET: i64 = 62_135_596_800;

#[derive(Debug, Default, Clone)]
pub struct Node {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Node>,
    pub(crate) protected: Option<Protected>,
}

impl Node {
    fn element(start: &BytesStart<'_>) -> Result<Node> {
        let mut node = Node {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Node::default()
        };

        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let value = attr.unescape_value().map_err(xml_error)?;
            node.attrs.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }

        Ok(node)
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn is_protected(&self) -> bool {
        self.attr("Protected")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"))
    }

    /// Visits protected values in this node and below, in document order.
    pub(crate) fn try_for_each_protected_mut(
        &mut self,
        f: &mut dyn FnMut(&mut Protected) -> Result<()>,
    ) -> Result<()> {
        if let Some(protected) = &mut self.protected {
            f(protected)?;
        }
        for child in &mut self.children {
            child.try_for_each_protected_mut(f)?;
        }

        Ok(())
    }
}

fn xml_error<E>(err: E) -> KpassError
where
    E: Display,
{
    corrupt(format!("malformed XML: {}", err))
}

/// Parses `data` into a document node whose children are the top-level
/// elements.
pub fn parse(data: &[u8]) -> Result<Node> {
    let mut reader = Reader::from_reader(data);
    let mut stack = vec![Node::default()];
    let mut buf = Vec::new();

    loop {
        let top = stack.len() - 1;

        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Start(start) => stack.push(Node::element(&start)?),
            Event::Empty(start) => {
                let node = Node::element(&start)?;
                stack[top].children.push(node);
            }
            Event::End(_) => {
                if top == 0 {
                    return Err(corrupt("unbalanced XML end tag"));
                }
                let node = stack.pop().unwrap_or_default();
                stack[top - 1].children.push(node);
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                stack[top].text.push_str(&text);
            }
            Event::CData(data) => {
                stack[top].text.push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(doc), true) => Ok(doc),
        _ => Err(corrupt("unclosed XML element")),
    }
}

pub(crate) fn encode_time(time: &DateTime<Utc>) -> String {
    BASE64.encode(&(time.timestamp() + KDBX_EPOCH_OFFSET).to_le_bytes())
}

/// Accepts both KDBX 4 binary times and ISO-8601 text.
pub(crate) fn decode_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if text.contains('-') || text.contains(':') {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|t| t.with_timezone(&Utc));
    }

    let bytes = BASE64.decode(text.as_bytes()).ok()?;
    let mut secs = [0u8; 8];
    if bytes.len() != secs.len() {
        return None;
    }
    secs.copy_from_slice(&bytes);

    let unix = i64::from_le_bytes(secs).checked_sub(KDBX_EPOCH_OFFSET)?;
    Utc.timestamp_opt(unix, 0).single()
}

pub(crate) struct Document {
    pub meta: Meta,
    pub root: Group,
    /// `Root` children after the root group, `DeletedObjects` among them.
    pub trailer: Vec<Node>,
    /// Keystream bytes covered by protected values.
    pub protected_len: usize,
}

/// Parses the payload XML into the database model. Protected values stay
/// locked.
pub(crate) fn read_document(data: &[u8]) -> Result<Document> {
    let mut doc = parse(data)?;

    let mut offset = 0;
    assign_offsets(&mut doc, &mut offset)?;

    let file = doc
        .children
        .into_iter()
        .find(|n| n.name == "KeePassFile")
        .ok_or_else(|| corrupt("missing KeePassFile element"))?;

    let mut meta = Meta::default();
    let mut root = None;
    for child in file.children {
        match child.name.as_str() {
            "Meta" => meta = meta_from(child),
            "Root" => root = Some(child),
            _ => {}
        }
    }

    let root = root.ok_or_else(|| KpassError::InvalidDatabase("missing Root element".to_owned()))?;
    let (mut groups, trailer): (Vec<Node>, Vec<Node>) =
        root.children.into_iter().partition(|n| n.name == "Group");

    if groups.len() != 1 {
        return Err(KpassError::InvalidDatabase(format!(
            "expected exactly one root group, found {}",
            groups.len()
        )));
    }

    let root = group_from(groups.remove(0))?;

    Ok(Document {
        meta,
        root,
        trailer,
        protected_len: offset,
    })
}

fn assign_offsets(node: &mut Node, offset: &mut usize) -> Result<()> {
    if node.is_protected() {
        let bytes = BASE64
            .decode(node.text.trim().as_bytes())
            .map_err(|e| corrupt(format!("bad protected value: {}", e)))?;
        let len = bytes.len();

        node.protected = Some(Protected {
            bytes: Zeroizing::new(bytes),
            offset: Some(*offset),
        });
        *offset += len;
    }

    for child in &mut node.children {
        assign_offsets(child, offset)?;
    }

    Ok(())
}

fn parse_bool(node: &Node) -> bool {
    node.text.trim().eq_ignore_ascii_case("true")
}

fn uuid_from(node: &Node) -> [u8; 16] {
    match BASE64.decode(node.text.trim().as_bytes()) {
        Ok(bytes) if bytes.len() == 16 => {
            let mut uuid = [0u8; 16];
            uuid.copy_from_slice(&bytes);
            uuid
        }
        _ => new_uuid(),
    }
}

fn meta_from(node: Node) -> Meta {
    let mut meta = Meta::default();

    for child in node.children {
        match child.name.as_str() {
            "Generator" => meta.generator = child.text,
            "DatabaseName" => meta.database_name = child.text,
            "DatabaseNameChanged" => {
                if let Some(time) = decode_time(&child.text) {
                    meta.database_name_changed = time;
                }
            }
            "RecycleBinEnabled" => meta.recycle_bin_enabled = parse_bool(&child),
            _ => meta.extra.push(child),
        }
    }

    meta
}

fn times_from(node: &Node) -> Times {
    let mut times = Times::default();

    for child in &node.children {
        let time = || decode_time(&child.text);
        match child.name.as_str() {
            "CreationTime" => times.creation = time().unwrap_or(times.creation),
            "LastModificationTime" => {
                times.last_modification = time().unwrap_or(times.last_modification)
            }
            "LastAccessTime" => times.last_access = time().unwrap_or(times.last_access),
            "ExpiryTime" => times.expiry = time().unwrap_or(times.expiry),
            "LocationChanged" => times.location_changed = time().unwrap_or(times.location_changed),
            "Expires" => times.expires = parse_bool(child),
            "UsageCount" => times.usage_count = child.text.trim().parse().unwrap_or(0),
            _ => {}
        }
    }

    times
}

fn group_from(node: Node) -> Result<Group> {
    let mut group = Group::new(String::new());

    for child in node.children {
        match child.name.as_str() {
            "UUID" => group.uuid = uuid_from(&child),
            "Name" => group.name = child.text,
            "IconID" => group.icon = child.text.trim().parse().unwrap_or(group.icon),
            "Times" => group.times = times_from(&child),
            "Group" => group.groups.push(group_from(child)?),
            "Entry" => group.entries.push(entry_from(child)?),
            _ => group.extra.push(child),
        }
    }

    Ok(group)
}

fn entry_from(node: Node) -> Result<Entry> {
    let mut entry = Entry::new(Utc::now());

    for child in node.children {
        match child.name.as_str() {
            "UUID" => entry.uuid = uuid_from(&child),
            "IconID" => entry.icon = child.text.trim().parse().unwrap_or(0),
            "Times" => entry.times = times_from(&child),
            "String" => {
                if let Some(field) = field_from(child) {
                    entry.fields.push(field);
                }
            }
            "History" => {
                for old in child.children.into_iter().filter(|n| n.name == "Entry") {
                    entry.history.push(entry_from(old)?);
                }
            }
            _ => entry.extra.push(child),
        }
    }

    Ok(entry)
}

fn field_from(node: Node) -> Option<Field> {
    let mut key = None;
    let mut value = Value::Plain(String::new());

    for child in node.children {
        match child.name.as_str() {
            "Key" => key = Some(child.text),
            "Value" => {
                value = match child.protected {
                    Some(protected) => Value::Protected(protected),
                    None => Value::Plain(child.text),
                }
            }
            _ => {}
        }
    }

    key.map(|key| Field { key, value })
}

struct DocumentWriter<'a> {
    writer: Writer<Vec<u8>>,
    stream: &'a mut InnerStream,
}

impl DocumentWriter<'_> {
    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| KpassError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.write(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.write(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, name: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            return self.write(Event::Empty(BytesStart::new(name)));
        }

        self.start(name)?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.text(name, if value { "True" } else { "False" })
    }

    fn time(&mut self, name: &str, time: &DateTime<Utc>) -> Result<()> {
        self.text(name, &encode_time(time))
    }

    fn value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Plain(text) => self.text("Value", text),
            Value::Protected(protected) => {
                let start = BytesStart::new("Value").with_attributes([("Protected", "True")]);
                self.protected(start, protected)
            }
        }
    }

    fn protected(&mut self, start: BytesStart<'_>, protected: &Protected) -> Result<()> {
        if protected.offset.is_some() {
            return Err(corrupt("cannot write a locked protected value"));
        }

        let mut bytes = Zeroizing::new(protected.bytes.to_vec());
        self.stream.apply(&mut bytes);
        let encoded = BASE64.encode(&bytes);

        if encoded.is_empty() {
            return self.write(Event::Empty(start));
        }

        let end = start.to_end().into_owned();
        self.write(Event::Start(start))?;
        self.write(Event::Text(BytesText::new(&encoded)))?;
        self.write(Event::End(end))
    }

    /// Writes back an element kept as it was read.
    fn node(&mut self, node: &Node) -> Result<()> {
        let mut start = BytesStart::new(node.name.as_str());
        for (key, value) in &node.attrs {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if let Some(protected) = &node.protected {
            return self.protected(start, protected);
        }

        // whitespace between child elements is not content
        let text = if node.children.is_empty() {
            node.text.as_str()
        } else {
            ""
        };
        if text.is_empty() && node.children.is_empty() {
            return self.write(Event::Empty(start));
        }

        self.write(Event::Start(start))?;
        if !text.is_empty() {
            self.write(Event::Text(BytesText::new(text)))?;
        }
        for child in &node.children {
            self.node(child)?;
        }
        self.end(&node.name)
    }

    fn nodes(&mut self, nodes: &[Node]) -> Result<()> {
        nodes.iter().try_for_each(|node| self.node(node))
    }

    fn meta(&mut self, meta: &Meta) -> Result<()> {
        self.start("Meta")?;
        self.text("Generator", &meta.generator)?;
        self.text("DatabaseName", &meta.database_name)?;
        self.time("DatabaseNameChanged", &meta.database_name_changed)?;

        if !has(&meta.extra, "MemoryProtection") {
            self.start("MemoryProtection")?;
            self.bool("ProtectTitle", false)?;
            self.bool("ProtectUserName", false)?;
            self.bool("ProtectPassword", true)?;
            self.bool("ProtectURL", false)?;
            self.bool("ProtectNotes", true)?;
            self.end("MemoryProtection")?;
        }

        self.bool("RecycleBinEnabled", meta.recycle_bin_enabled)?;
        self.nodes(&meta.extra)?;
        self.end("Meta")
    }

    fn times(&mut self, times: &Times) -> Result<()> {
        self.start("Times")?;
        self.time("CreationTime", &times.creation)?;
        self.time("LastModificationTime", &times.last_modification)?;
        self.time("LastAccessTime", &times.last_access)?;
        self.time("ExpiryTime", &times.expiry)?;
        self.bool("Expires", times.expires)?;
        self.text("UsageCount", &times.usage_count.to_string())?;
        self.time("LocationChanged", &times.location_changed)?;
        self.end("Times")
    }

    fn group(&mut self, group: &Group) -> Result<()> {
        self.start("Group")?;
        self.text("UUID", &BASE64.encode(&group.uuid))?;
        self.text("Name", &group.name)?;
        self.text("IconID", &group.icon.to_string())?;
        self.times(&group.times)?;
        if !has(&group.extra, "IsExpanded") {
            self.bool("IsExpanded", true)?;
        }
        self.nodes(&group.extra)?;

        for entry in &group.entries {
            self.entry(entry, true)?;
        }
        for child in &group.groups {
            self.group(child)?;
        }

        self.end("Group")
    }

    fn entry(&mut self, entry: &Entry, with_history: bool) -> Result<()> {
        self.start("Entry")?;
        self.text("UUID", &BASE64.encode(&entry.uuid))?;
        self.text("IconID", &entry.icon.to_string())?;
        self.times(&entry.times)?;

        for field in &entry.fields {
            self.start("String")?;
            self.text("Key", &field.key)?;
            self.value(&field.value)?;
            self.end("String")?;
        }
        self.nodes(&entry.extra)?;

        if with_history && !entry.history.is_empty() {
            self.start("History")?;
            for old in &entry.history {
                self.entry(old, false)?;
            }
            self.end("History")?;
        }

        self.end("Entry")
    }
}

fn has(nodes: &[Node], name: &str) -> bool {
    nodes.iter().any(|n| n.name == name)
}

/// Serializes the model, XORing protected values with `stream` in document
/// order.
pub(crate) fn write_document(
    meta: &Meta,
    root: &Group,
    trailer: &[Node],
    stream: &mut InnerStream,
) -> Result<Vec<u8>> {
    let mut doc = DocumentWriter {
        writer: Writer::new_with_indent(Vec::new(), b'\t', 1),
        stream,
    };

    doc.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    doc.start("KeePassFile")?;
    doc.meta(meta)?;
    doc.start("Root")?;
    doc.group(root)?;
    if !has(trailer, "DeletedObjects") {
        doc.write(Event::Empty(BytesStart::new("DeletedObjects")))?;
    }
    doc.nodes(trailer)?;
    doc.end("Root")?;
    doc.end("KeePassFile")?;

    Ok(doc.writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdbx::crypto::STREAM_CHACHA20;

    #[test]
    fn dom() {
        let doc = parse(b"<a x=\"1\"><b>hi &amp; bye</b><c/><b>two</b></a>").unwrap();
        let a = doc.child("a").unwrap();

        assert_eq!(a.attr("x"), Some("1"));
        assert_eq!(a.child("b").unwrap().text, "hi & bye");
        assert_eq!(a.children.len(), 3);
        assert!(parse(b"<a><b></a>").is_err());
        assert!(parse(b"<a>").is_err());
    }

    #[test]
    fn times() {
        let time = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(decode_time(&encode_time(&time)), Some(time));
        assert_eq!(decode_time("2021-03-04T05:06:07Z"), Some(time));
        assert_eq!(decode_time("garbage"), None);

        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(encode_time(&epoch), BASE64.encode(&KDBX_EPOCH_OFFSET.to_le_bytes()));
    }

    fn document(groups: &str) -> String {
        format!(
            "<?xml version=\"1.0\"?><KeePassFile><Meta><Generator>x</Generator></Meta>\
             <Root>{}</Root></KeePassFile>",
            groups
        )
    }

    #[test]
    fn root_shape() {
        let two = document("<Group><Name>a</Name></Group><Group><Name>b</Name></Group>");
        assert!(matches!(
            read_document(two.as_bytes()),
            Err(KpassError::InvalidDatabase(_))
        ));
        assert!(matches!(
            read_document(document("").as_bytes()),
            Err(KpassError::InvalidDatabase(_))
        ));

        let one = read_document(document("<Group><Name>a</Name></Group>").as_bytes()).unwrap();
        assert_eq!(one.root.name, "a");
        assert_eq!(one.meta.generator, "x");
    }

    #[test]
    fn protected_offsets_follow_document_order() {
        let xml = document(
            "<Group><Name>r</Name>\
             <Entry><String><Key>Password</Key><Value Protected=\"True\">AAAA</Value></String>\
             <History><Entry><String><Key>Password</Key><Value Protected=\"True\">AA==</Value></String></Entry></History>\
             </Entry>\
             <Group><Name>g</Name><Entry><String><Key>Notes</Key><Value Protected=\"True\">AAA=</Value></String></Entry></Group>\
             </Group>",
        );
        let doc = read_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.protected_len, 3 + 1 + 2);

        let offset = |value: &Value| match value {
            Value::Protected(p) => p.offset,
            Value::Plain(_) => None,
        };
        let entry = &doc.root.entries[0];
        assert_eq!(offset(&entry.fields[0].value), Some(0));
        assert_eq!(offset(&entry.history[0].fields[0].value), Some(3));
        assert_eq!(offset(&doc.root.groups[0].entries[0].fields[0].value), Some(4));
    }

    #[test]
    fn written_document_reads_back() {
        let mut root = Group::new("root");
        let mut entry = Entry::new(Utc::now());
        entry.set("Title", Value::Plain("<t&t>".to_owned()));
        entry.set("Password", Value::protected("s3cret"));
        entry.set("Empty", Value::protected(""));
        root.ensure(&["a".to_owned()]).entries.push(entry);

        let key = [7u8; 64];
        let mut stream = InnerStream::new(STREAM_CHACHA20, &key).unwrap();
        let xml = write_document(&Meta::default(), &root, &[], &mut stream).unwrap();
        let text = String::from_utf8(xml.clone()).unwrap();
        assert!(!text.contains("s3cret"));
        assert!(text.contains("<DeletedObjects/>"));

        let doc = read_document(&xml).unwrap();
        let entry = &doc.root.groups[0].entries[0];
        assert_eq!(entry.title(), Some("<t&t>"));
        assert_eq!(entry.get("Password"), None);
        assert_eq!(doc.protected_len, 6);
    }

    #[test]
    fn unknown_elements_survive_a_rewrite() {
        let xml = document(
            "<Group><Name>r</Name><Notes>group notes</Notes><IsExpanded>False</IsExpanded>\
             <Entry><UUID>AAAAAAAAAAAAAAAAAAAAAA==</UUID><Tags>work;mail</Tags>\
             <String><Key>Title</Key><Value>t</Value></String>\
             <Binary><Key>a.txt</Key><Value Ref=\"0\"/></Binary>\
             <CustomData><Item><Key>k</Key><Value Protected=\"True\">AAA=</Value></Item></CustomData>\
             </Entry></Group>\
             <DeletedObjects><DeletedObject><UUID>AQAAAAAAAAAAAAAAAAAAAA==</UUID></DeletedObject></DeletedObjects>",
        );
        let mut doc = read_document(xml.as_bytes()).unwrap();
        assert_eq!(doc.protected_len, 2);
        assert!(has(&doc.root.extra, "Notes"));
        assert!(has(&doc.root.entries[0].extra, "Tags"));
        assert_eq!(doc.trailer.len(), 1);

        // stand in for Database::unlock on the one protected value
        doc.root.entries[0].extra[2]
            .try_for_each_protected_mut(&mut |p| {
                p.offset = None;
                Ok(())
            })
            .unwrap();

        let key = [3u8; 64];
        let mut stream = InnerStream::new(STREAM_CHACHA20, &key).unwrap();
        let written = write_document(&doc.meta, &doc.root, &doc.trailer, &mut stream).unwrap();
        let text = String::from_utf8(written.clone()).unwrap();
        assert_eq!(text.matches("<IsExpanded>").count(), 1);
        assert_eq!(text.matches("DeletedObjects").count(), 2);
        assert!(text.contains("<Value Ref=\"0\"/>"));

        let again = read_document(&written).unwrap();
        let entry = &again.root.entries[0];
        assert_eq!(entry.extra.iter().find(|n| n.name == "Tags").unwrap().text, "work;mail");
        assert_eq!(
            again.root.extra.iter().find(|n| n.name == "Notes").unwrap().text,
            "group notes"
        );
        assert!(has(&entry.extra, "Binary"));
        assert_eq!(again.protected_len, 2);
        assert_eq!(again.trailer[0].children.len(), 1);
    }
}
