//! Avahi service file (`<id>.service`) document model.
//!
//! See avahi.service(5). Documents are validated on construction from a
//! [`ServiceGroup`]; documents read back from disk are only checked for
//! well-formed enum attributes and port numbers.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use anyhow::{bail, Context, Result as AnyResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use shared::types::{IpVersion, Service, ServiceGroup, TxtFormat, TxtRecord};
use crate::error::{Error, Result};
use crate::store::json_file;

pub const HEADER: &str = "<?xml version=\"1.0\" standalone='no'?><!--*-nxml-*-->\n<!DOCTYPE service-group SYSTEM \"avahi-service.dtd\">\n";

const INDENT: usize = 2;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[a-zA-Z0-9.\-_ #()\[\]!"$%?='*+:,|@~]+$"#).expect("valid name regex")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^_[a-z0-9-]+\._(?:tcp|udp)$").expect("valid type regex")
});
static SUBTYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:_[a-z0-9-]+\._sub\.)?_[a-z0-9-]+\._(?:tcp|udp)$").expect("valid subtype regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceGroupDoc {
    pub name: NameElement,
    pub services: Vec<ServiceElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NameElement {
    /// "yes" or "no"
    pub replace_wildcards: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceElement {
    pub protocol: String,
    pub service_type: String,
    pub subtypes: Vec<String>,
    pub domain_name: Option<String>,
    pub host_name: Option<String>,
    pub port: u16,
    pub txt_records: Vec<TxtRecordElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxtRecordElement {
    pub value_format: String,
    pub value: String,
}

impl ServiceGroupDoc {
    /// Build a document from a service group, validating every field.
    pub fn new(group: &ServiceGroup) -> Result<Self> {
        if !NAME_RE.is_match(&group.name) {
            return Err(Error::invalid_input(format!("invalid name format '{}'", group.name)));
        }
        if group.services.is_empty() {
            return Err(Error::invalid_input("no services defined"));
        }

        let services = group
            .services
            .iter()
            .map(ServiceElement::new)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: NameElement {
                replace_wildcards: if group.replace_wildcards { "yes" } else { "no" }.to_string(),
                value: group.name.clone(),
            },
            services,
        })
    }

    /// Convert back into a service group identified by `id`.
    pub fn into_group(self, id: String) -> AnyResult<ServiceGroup> {
        let services = self
            .services
            .into_iter()
            .map(ServiceElement::into_service)
            .collect::<AnyResult<Vec<_>>>()?;

        Ok(ServiceGroup {
            id,
            name: self.name.value,
            replace_wildcards: self.name.replace_wildcards == "yes",
            services,
        })
    }

    /// Structural elements are indented; character data stays inline and
    /// unpadded since avahi publishes it verbatim.
    pub fn to_xml(&self) -> AnyResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', INDENT);

        writer.write_event(Event::Start(BytesStart::new("service-group")))?;
        write_text_element(
            &mut writer,
            BytesStart::new("name")
                .with_attributes([("replace-wildcards", self.name.replace_wildcards.as_str())]),
            &self.name.value,
        )?;
        for service in &self.services {
            service.write(&mut writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new("service-group")))?;

        let body = String::from_utf8(writer.into_inner()).context("Failed to encode service group")?;
        Ok(format!("{}{}\n", HEADER, body))
    }

    pub fn from_xml(content: &str) -> AnyResult<Self> {
        let root = Node::parse(content)?;
        if root.tag != "service-group" {
            bail!("unexpected root element '{}'", root.tag);
        }

        let mut name = None;
        let mut services = Vec::new();
        for child in root.children {
            match child.tag.as_str() {
                "name" => {
                    name = Some(NameElement {
                        replace_wildcards: child.attr("replace-wildcards").unwrap_or("no").to_string(),
                        value: child.text,
                    });
                }
                "service" => services.push(ServiceElement::from_node(child)?),
                other => tracing::debug!("Ignoring element '{}'", other),
            }
        }

        Ok(Self {
            name: name.context("missing name element")?,
            services,
        })
    }
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, start: BytesStart<'_>, text: &str) -> AnyResult<()> {
    let end = start.to_end().into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(end))?;
    Ok(())
}

/// Minimal element tree; text is kept exactly as read.
#[derive(Debug, Default)]
struct Node {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    children: Vec<Node>,
}

impl Node {
    fn parse(content: &str) -> AnyResult<Node> {
        let mut reader = Reader::from_str(content);
        let mut stack: Vec<Node> = Vec::new();

        loop {
            match reader.read_event().context("Malformed service file")? {
                Event::Start(e) => stack.push(Node::from_start(&e)?),
                Event::Empty(e) => {
                    let node = Node::from_start(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Event::End(_) => {
                    let node = stack.pop().context("unbalanced end element")?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None => return Ok(node),
                    }
                }
                Event::Text(e) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(node) = stack.last_mut() {
                        node.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => bail!("unexpected end of service file"),
                _ => {}
            }
        }
    }

    fn from_start(e: &BytesStart<'_>) -> AnyResult<Node> {
        let mut attrs = HashMap::new();
        for attr in e.attributes() {
            let attr = attr?;
            attrs.insert(
                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                attr.unescape_value()?.to_string(),
            );
        }

        Ok(Node {
            tag: String::from_utf8_lossy(e.name().as_ref()).to_string(),
            attrs,
            ..Default::default()
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }
}

impl ServiceElement {
    fn new(service: &Service) -> Result<Self> {
        if !TYPE_RE.is_match(&service.service_type) {
            return Err(Error::invalid_input(format!(
                "invalid type format '{}'",
                service.service_type
            )));
        }
        if let Some(subtype) = service.subtypes.iter().find(|s| !SUBTYPE_RE.is_match(s)) {
            return Err(Error::invalid_input(format!("invalid subtype format '{}'", subtype)));
        }

        Ok(Self {
            protocol: service.ip_version.as_str().to_string(),
            service_type: service.service_type.clone(),
            subtypes: service.subtypes.clone(),
            domain_name: service.domain_name.clone(),
            host_name: service.host_name.clone(),
            port: service.port,
            txt_records: service
                .txt_records
                .iter()
                .map(|record| TxtRecordElement {
                    value_format: record.format.as_str().to_string(),
                    value: record.value.clone(),
                })
                .collect(),
        })
    }

    fn into_service(self) -> AnyResult<Service> {
        let ip_version = self.protocol.parse::<IpVersion>().map_err(anyhow::Error::msg)?;
        let txt_records = self
            .txt_records
            .into_iter()
            .map(|record| {
                Ok(TxtRecord {
                    format: record.value_format.parse::<TxtFormat>().map_err(anyhow::Error::msg)?,
                    value: record.value,
                })
            })
            .collect::<AnyResult<Vec<_>>>()?;

        Ok(Service {
            service_type: self.service_type,
            subtypes: self.subtypes,
            domain_name: self.domain_name,
            host_name: self.host_name,
            port: self.port,
            ip_version,
            txt_records,
        })
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> AnyResult<()> {
        let start = BytesStart::new("service").with_attributes([("protocol", self.protocol.as_str())]);
        writer.write_event(Event::Start(start))?;

        write_text_element(writer, BytesStart::new("type"), &self.service_type)?;
        for subtype in &self.subtypes {
            write_text_element(writer, BytesStart::new("subtype"), subtype)?;
        }
        if let Some(domain_name) = &self.domain_name {
            write_text_element(writer, BytesStart::new("domain-name"), domain_name)?;
        }
        if let Some(host_name) = &self.host_name {
            write_text_element(writer, BytesStart::new("host-name"), host_name)?;
        }
        write_text_element(writer, BytesStart::new("port"), &self.port.to_string())?;
        for record in &self.txt_records {
            write_text_element(
                writer,
                BytesStart::new("txt-record")
                    .with_attributes([("value-format", record.value_format.as_str())]),
                &record.value,
            )?;
        }

        writer.write_event(Event::End(BytesEnd::new("service")))?;
        Ok(())
    }

    /// Missing attributes take the avahi defaults. Token elements are trimmed;
    /// TXT values are kept verbatim.
    fn from_node(node: Node) -> AnyResult<Self> {
        let mut service_type = None;
        let mut port = None;
        let mut subtypes = Vec::new();
        let mut domain_name = None;
        let mut host_name = None;
        let mut txt_records = Vec::new();

        for child in &node.children {
            match child.tag.as_str() {
                "type" => service_type = Some(child.text.trim().to_string()),
                "subtype" => subtypes.push(child.text.trim().to_string()),
                "domain-name" => domain_name = Some(child.text.trim().to_string()),
                "host-name" => host_name = Some(child.text.trim().to_string()),
                "port" => {
                    let value = child.text.trim();
                    port = Some(
                        value
                            .parse::<u16>()
                            .with_context(|| format!("invalid port '{}'", value))?,
                    );
                }
                "txt-record" => txt_records.push(TxtRecordElement {
                    value_format: child
                        .attr("value-format")
                        .unwrap_or(TxtFormat::default().as_str())
                        .to_string(),
                    value: child.text.clone(),
                }),
                other => tracing::debug!("Ignoring element '{}'", other),
            }
        }

        Ok(Self {
            protocol: node.attr("protocol").unwrap_or(IpVersion::default().as_str()).to_string(),
            service_type: service_type.context("missing type element")?,
            subtypes,
            domain_name,
            host_name,
            port: port.context("missing port element")?,
            txt_records,
        })
    }
}

pub fn read(path: &Path) -> AnyResult<ServiceGroupDoc> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    ServiceGroupDoc::from_xml(&content).with_context(|| format!("Invalid service file {}", path.display()))
}

/// Full rewrite of the service file.
pub fn write(doc: &ServiceGroupDoc, path: &Path) -> AnyResult<()> {
    let content = doc.to_xml()?;
    json_file::replace(path, content.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(service_type: &str) -> Service {
        Service {
            service_type: service_type.to_string(),
            subtypes: Vec::new(),
            domain_name: None,
            host_name: None,
            port: 8080,
            ip_version: IpVersion::Any,
            txt_records: Vec::new(),
        }
    }

    fn group(name: &str, services: Vec<Service>) -> ServiceGroup {
        ServiceGroup {
            id: "test".to_string(),
            name: name.to_string(),
            replace_wildcards: false,
            services,
        }
    }

    #[test]
    fn test_name_validation() {
        assert!(ServiceGroupDoc::new(&group("Web Server on %h", vec![service("_http._tcp")])).is_ok());
        assert!(ServiceGroupDoc::new(&group("Printer [2] (lab) #1", vec![service("_ipp._tcp")])).is_ok());

        let result = ServiceGroupDoc::new(&group("bad<name>", vec![service("_http._tcp")]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        let result = ServiceGroupDoc::new(&group("", vec![service("_http._tcp")]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_services_required() {
        let result = ServiceGroupDoc::new(&group("Web", Vec::new()));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_type_validation() {
        for valid in ["_http._tcp", "_dns-sd._udp", "_x1._tcp"] {
            assert!(ServiceGroupDoc::new(&group("Web", vec![service(valid)])).is_ok(), "{}", valid);
        }
        for invalid in ["http._tcp", "_http._sctp", "_HTTP._tcp", "_http", "_http._tcp.local"] {
            let result = ServiceGroupDoc::new(&group("Web", vec![service(invalid)]));
            assert!(matches!(result, Err(Error::InvalidInput(_))), "{}", invalid);
        }
    }

    #[test]
    fn test_subtype_validation() {
        let mut s = service("_http._tcp");
        s.subtypes = vec!["_printer._sub._http._tcp".to_string(), "_ipp._tcp".to_string()];
        assert!(ServiceGroupDoc::new(&group("Web", vec![s.clone()])).is_ok());

        s.subtypes.push("_printer._http._tcp".to_string());
        let result = ServiceGroupDoc::new(&group("Web", vec![s]));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_xml_layout() {
        let mut s = service("_http._tcp");
        s.subtypes = vec!["_web._sub._http._tcp".to_string()];
        s.host_name = Some("gateway.local".to_string());
        s.ip_version = IpVersion::Ipv4;
        s.txt_records = vec![TxtRecord {
            value: "path=/api".to_string(),
            format: TxtFormat::Text,
        }];
        let mut g = group("Web", vec![s]);
        g.replace_wildcards = true;

        let xml = ServiceGroupDoc::new(&g).unwrap().to_xml().unwrap();

        assert!(xml.starts_with(HEADER));
        assert!(xml.contains("<service-group>"));
        assert!(xml.contains(r#"<name replace-wildcards="yes">Web</name>"#));
        assert!(xml.contains(r#"<service protocol="ipv4">"#));
        assert!(xml.contains("  <service"));
        assert!(xml.contains("<type>_http._tcp</type>"));
        assert!(xml.contains("<subtype>_web._sub._http._tcp</subtype>"));
        assert!(xml.contains("<host-name>gateway.local</host-name>"));
        assert!(!xml.contains("<domain-name>"));
        assert!(xml.contains("<port>8080</port>"));
        assert!(xml.contains(r#"<txt-record value-format="text">path=/api</txt-record>"#));
    }

    #[test]
    fn test_character_data_kept_verbatim() {
        let mut s = service("_http._tcp");
        s.txt_records = vec![TxtRecord {
            value: " key=a b ".to_string(),
            format: TxtFormat::Text,
        }];
        let g = group("Web \"lab\" & co ", vec![s]);

        let xml = ServiceGroupDoc::new(&g).unwrap().to_xml().unwrap();
        assert!(xml.contains(r#"<txt-record value-format="text"> key=a b </txt-record>"#));
        assert!(xml.contains("&amp; co </name>"));

        let reloaded = ServiceGroupDoc::from_xml(&xml).unwrap().into_group("test".to_string()).unwrap();
        assert_eq!(reloaded, g);
    }

    #[test]
    fn test_missing_port_rejected() {
        let xml = r#"<service-group><name>x</name><service><type>_a._tcp</type></service></service-group>"#;
        assert!(ServiceGroupDoc::from_xml(xml).is_err());

        let xml = r#"<service-group><name>x</name><service><type>_a._tcp</type><port>http</port></service></service-group>"#;
        assert!(ServiceGroupDoc::from_xml(xml).is_err());
    }

    #[test]
    fn test_read_avahi_file() {
        let xml = r#"<?xml version="1.0" standalone='no'?><!--*-nxml-*-->
<!DOCTYPE service-group SYSTEM "avahi-service.dtd">
<service-group>
  <name replace-wildcards="yes">%h</name>
  <service>
    <type>_ssh._tcp</type>
    <port>22</port>
  </service>
  <service protocol="ipv6">
    <type>_sftp-ssh._tcp</type>
    <subtype>_files._sub._sftp-ssh._tcp</subtype>
    <port>22</port>
    <txt-record value-format="binary-hex">0a0b</txt-record>
    <txt-record>u=admin</txt-record>
  </service>
</service-group>
"#;

        let g = ServiceGroupDoc::from_xml(xml).unwrap().into_group("ssh".to_string()).unwrap();

        assert_eq!(g.id, "ssh");
        assert_eq!(g.name, "%h");
        assert!(g.replace_wildcards);
        assert_eq!(g.services.len(), 2);
        assert_eq!(g.services[0].ip_version, IpVersion::Any);
        assert_eq!(g.services[0].port, 22);
        assert_eq!(g.services[1].ip_version, IpVersion::Ipv6);
        assert_eq!(g.services[1].subtypes, vec!["_files._sub._sftp-ssh._tcp"]);
        assert_eq!(g.services[1].txt_records[0].format, TxtFormat::BinaryHex);
        assert_eq!(g.services[1].txt_records[1].format, TxtFormat::Text);
        assert_eq!(g.services[1].txt_records[1].value, "u=admin");
    }

    #[test]
    fn test_invalid_protocol_in_file() {
        let xml = r#"<service-group><name>x</name><service protocol="ipx"><type>_a._tcp</type><port>1</port></service></service-group>"#;
        let doc = ServiceGroupDoc::from_xml(xml).unwrap();
        assert!(doc.into_group("x".to_string()).is_err());
    }
}
