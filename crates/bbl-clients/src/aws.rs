use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use quick_xml::{events::Event as XmlEvent, Reader as XmlReader};
use sha2::{Digest, Sha256};
use tracing::debug;

use bbl_domain::AwsCredentials;

use crate::client::{InstanceLister, KeyPairClient, NetworkClient, RemoteKeyPair};
use crate::error::ClientError;

type HmacSha256 = Hmac<Sha256>;

const EC2_API_VERSION: &str = "2016-11-15";

/// EC2 capability client. Talks to the EC2 Query API directly with SigV4
/// request signing; responses are XML.
pub struct AwsClient {
    creds: AwsCredentials,
    client: reqwest::Client,
    ec2_base: String,
}

impl AwsClient {
    pub fn new(creds: AwsCredentials) -> Self {
        let ec2_base = format!("https://ec2.{}.amazonaws.com", creds.region);
        Self {
            creds,
            client: reqwest::Client::new(),
            ec2_base,
        }
    }

    /// Issue one EC2 Query API action and return the response body.
    /// Non-2xx responses are surfaced as [`ClientError::Api`] with the
    /// EC2 error code extracted from the XML body.
    async fn ec2(&self, action: &str, params: &[(&str, &str)]) -> Result<String, ClientError> {
        let mut pairs: Vec<(String, String)> = vec![
            ("Action".into(), action.into()),
            ("Version".into(), EC2_API_VERSION.into()),
        ];
        pairs.extend(params.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        pairs.sort();
        let body = form_encode(&pairs);

        let host = self
            .ec2_base
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        let content_type = "application/x-www-form-urlencoded; charset=utf-8";
        let headers = sigv4_headers(
            "POST",
            "/",
            "",
            content_type,
            body.as_bytes(),
            &self.creds,
            "ec2",
            &host,
        );

        let mut req = self
            .client
            .post(format!("{}/", self.ec2_base.trim_end_matches('/')))
            .header("content-type", content_type)
            .body(body);
        for (k, v) in headers {
            req = req.header(k, v);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(action, %status, "ec2 response");

        if !status.is_success() {
            return Err(ClientError::Api {
                code: xml_text(&text, "Code").unwrap_or_else(|| status.to_string()),
                message: xml_text(&text, "Message").unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl NetworkClient for AwsClient {
    async fn check_exists(&self, env_id: &str) -> Result<bool, ClientError> {
        let name = format!("{}-vpc", env_id);
        let body = self
            .ec2(
                "DescribeVpcs",
                &[
                    ("Filter.1.Name", "tag:Name"),
                    ("Filter.1.Value.1", name.as_str()),
                ],
            )
            .await?;
        Ok(xml_text(&body, "vpcId").is_some())
    }
}

#[async_trait]
impl KeyPairClient for AwsClient {
    async fn describe(&self, name: &str) -> Result<Option<RemoteKeyPair>, ClientError> {
        let result = self
            .ec2("DescribeKeyPairs", &[("KeyName.1", name)])
            .await;
        match result {
            Ok(body) => Ok(xml_text(&body, "keyFingerprint").map(|fingerprint| RemoteKeyPair {
                name: name.to_string(),
                fingerprint,
            })),
            Err(ClientError::Api { code, .. }) if code == "InvalidKeyPair.NotFound" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn import(&self, name: &str, public_key: &str) -> Result<(), ClientError> {
        let material = base64::engine::general_purpose::STANDARD.encode(public_key.trim());
        self.ec2(
            "ImportKeyPair",
            &[("KeyName", name), ("PublicKeyMaterial", material.as_str())],
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), ClientError> {
        match self.ec2("DeleteKeyPair", &[("KeyName", name)]).await {
            Ok(_) => Ok(()),
            Err(ClientError::Api { code, .. }) if code == "InvalidKeyPair.NotFound" => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl InstanceLister for AwsClient {
    async fn list_instances(&self, network_id: &str) -> Result<Vec<String>, ClientError> {
        let body = self
            .ec2(
                "DescribeInstances",
                &[
                    ("Filter.1.Name", "vpc-id"),
                    ("Filter.1.Value.1", network_id),
                    ("Filter.2.Name", "instance-state-name"),
                    ("Filter.2.Value.1", "running"),
                    ("Filter.2.Value.2", "pending"),
                ],
            )
            .await?;
        Ok(instance_name_tags(&body))
    }
}

// ── SigV4 signing ─────────────────────────────────────────────────────────────

/// Build SigV4 request headers for an EC2 API call.
fn sigv4_headers(
    method: &str,
    uri_path: &str,
    query_string: &str,
    content_type: &str,
    body: &[u8],
    creds: &AwsCredentials,
    service: &str,
    host: &str,
) -> BTreeMap<String, String> {
    let now = chrono::Utc::now();
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let payload_hash = sha256_hex(body);

    // Canonical headers (must be sorted and lowercased)
    let mut canon_hdrs: BTreeMap<String, String> = BTreeMap::new();
    canon_hdrs.insert("content-type".into(), content_type.into());
    canon_hdrs.insert("host".into(), host.into());
    canon_hdrs.insert("x-amz-content-sha256".into(), payload_hash.clone());
    canon_hdrs.insert("x-amz-date".into(), timestamp.clone());

    let signed_headers: String = canon_hdrs.keys().cloned().collect::<Vec<_>>().join(";");
    let canonical_headers: String = canon_hdrs
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, uri_path, query_string, canonical_headers, signed_headers, payload_hash
    );

    let scope = format!("{}/{}/{}/aws4_request", date, creds.region, service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        timestamp,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(&creds.secret_access_key, &date, &creds.region, service);
    let signature = hmac_sha256(&signing_key, string_to_sign.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>();

    let auth = format!(
        "AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}",
        creds.access_key_id, scope, signed_headers, signature
    );

    let mut out = BTreeMap::new();
    out.insert("Authorization".into(), auth);
    out.insert("x-amz-date".into(), timestamp);
    out.insert("x-amz-content-sha256".into(), payload_hash);
    out
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ── Form encoding ─────────────────────────────────────────────────────────────

fn form_encode(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

// ── XML helpers ───────────────────────────────────────────────────────────────

/// Text content of the first `tag` element, at any depth.
fn xml_text(xml: &str, tag: &str) -> Option<String> {
    let tag_bytes = tag.as_bytes();
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut in_tag = false;
    let mut depth: usize = 0;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => {
                if !in_tag && e.local_name().as_ref() == tag_bytes {
                    in_tag = true;
                    depth = 0;
                } else if in_tag {
                    depth += 1;
                }
            }
            Ok(XmlEvent::End(_)) => {
                if in_tag {
                    if depth == 0 {
                        return None;
                    }
                    depth -= 1;
                }
            }
            Ok(XmlEvent::Text(e)) if in_tag && depth == 0 => {
                return e.unescape().ok().map(|s| s.into_owned());
            }
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }
    None
}

/// Values of `<value>` elements whose sibling `<key>` was `Name`, i.e. the
/// Name tags of a DescribeInstances response.
fn instance_name_tags(xml: &str) -> Vec<String> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut result = Vec::new();
    let mut current: Option<&'static str> = None;
    let mut last_key_was_name = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => match e.local_name().as_ref() {
                b"key" => current = Some("key"),
                b"value" => current = Some("value"),
                _ => current = None,
            },
            Ok(XmlEvent::Text(e)) => {
                if let Ok(text) = e.unescape() {
                    match current {
                        Some("key") => last_key_was_name = text.as_ref() == "Name",
                        Some("value") => {
                            if last_key_was_name {
                                result.push(text.into_owned());
                                last_key_was_name = false;
                            }
                        }
                        _ => {}
                    }
                }
            }
            Ok(XmlEvent::End(_)) => current = None,
            Ok(XmlEvent::Eof) | Err(_) => break,
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xml_text_finds_simple_element() {
        let xml =
            "<DescribeVpcsResponse><vpcSet><item><vpcId>vpc-abc123</vpcId></item></vpcSet></DescribeVpcsResponse>";
        assert_eq!(xml_text(xml, "vpcId"), Some("vpc-abc123".into()));
    }

    #[test]
    fn xml_text_returns_none_for_missing() {
        let xml = "<Foo><Bar>baz</Bar></Foo>";
        assert_eq!(xml_text(xml, "Qux"), None);
    }

    #[test]
    fn instance_name_tags_pick_only_name_values() {
        let xml = r#"
            <DescribeInstancesResponse>
              <reservationSet><item><instancesSet><item>
                <tagSet>
                  <item><key>Name</key><value>user-workload</value></item>
                  <item><key>env</key><value>prod</value></item>
                </tagSet>
              </item></instancesSet></item>
              <item><instancesSet><item>
                <tagSet>
                  <item><key>Name</key><value>bbl-demo-nat</value></item>
                </tagSet>
              </item></instancesSet></item></reservationSet>
            </DescribeInstancesResponse>"#;
        assert_eq!(
            instance_name_tags(xml),
            vec!["user-workload".to_string(), "bbl-demo-nat".to_string()]
        );
    }

    #[test]
    fn form_encoding_escapes_base64_material() {
        let pairs = vec![
            ("KeyName".to_string(), "keypair-x".to_string()),
            ("PublicKeyMaterial".to_string(), "c3NoK2E=".to_string()),
        ];
        let body = form_encode(&pairs);
        assert_eq!(body, "KeyName=keypair-x&PublicKeyMaterial=c3NoK2E%3D");
    }

    #[test]
    fn sigv4_produces_stable_header_set() {
        let creds = AwsCredentials {
            access_key_id: "AKID".into(),
            secret_access_key: "SECRET".into(),
            region: "us-east-1".into(),
        };
        let headers = sigv4_headers(
            "POST",
            "/",
            "",
            "application/x-www-form-urlencoded; charset=utf-8",
            b"Action=DescribeVpcs",
            &creds,
            "ec2",
            "ec2.us-east-1.amazonaws.com",
        );
        assert!(headers.contains_key("Authorization"));
        assert!(headers.contains_key("x-amz-date"));
        assert!(headers["Authorization"].starts_with("AWS4-HMAC-SHA256 Credential=AKID/"));
    }
}
