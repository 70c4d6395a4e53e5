//! DigitalOcean droplet provider (API v2).

use crate::{instance_names, CloudProvider, CreatedInstance};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.digitalocean.com/v2";

// Droplet defaults for disposable scan hosts: smallest size, a Debian image
// whose stock apt repos carry nmap, no extras.
const DROPLET_SIZE: &str = "s-1vcpu-512mb-10gb";
const DROPLET_IMAGE: &str = "debian-12-x64";

pub struct DigitalOceanProvider {
    client: Client,
    token: String,
}

impl DigitalOceanProvider {
    pub fn new(token: String) -> Self {
        // Default reqwest client has no overall timeout. If the API stalls,
        // a poll loop can hang forever.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap();
        Self {
            client,
            token: token.trim().to_string(),
        }
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", self.token)).unwrap(),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        headers
    }
}

#[async_trait]
impl CloudProvider for DigitalOceanProvider {
    async fn list_regions(&self) -> Result<Vec<String>> {
        let url = format!("{}/regions?per_page=200", API_BASE);
        let resp = self.client.get(&url).headers(self.headers()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "DigitalOcean list_regions failed: status={} body={}",
                status.as_u16(),
                text
            ));
        }

        let body: serde_json::Value = resp.json().await?;
        let regions = body["regions"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("no regions array in response"))?
            .iter()
            .filter(|r| r["available"].as_bool().unwrap_or(false))
            .filter_map(|r| r["slug"].as_str().map(|s| s.to_string()))
            .collect::<Vec<_>>();
        debug!(count = regions.len(), "listed available regions");
        Ok(regions)
    }

    async fn create_instances(
        &self,
        name_prefix: &str,
        region: &str,
        key_fingerprint: &str,
        count: usize,
    ) -> Result<Vec<CreatedInstance>> {
        // One POST creates the whole batch; a rejected request creates
        // nothing, which keeps the all-or-nothing trait contract.
        let url = format!("{}/droplets", API_BASE);
        let names = instance_names(name_prefix, count);
        let body = json!({
            "names": names,
            "region": region,
            "size": DROPLET_SIZE,
            "image": DROPLET_IMAGE,
            "ssh_keys": [key_fingerprint],
            "backups": false,
            "ipv6": false,
            "tags": ["scour"],
        });

        debug!(region, count, "creating droplets");
        let resp = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "DigitalOcean create_instances failed: region={} status={} body={}",
                region,
                status.as_u16(),
                text
            ));
        }

        let json_resp: serde_json::Value = resp.json().await?;
        let droplets = json_resp["droplets"]
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("no droplets array in create response"))?;

        let mut created = Vec::with_capacity(droplets.len());
        for d in droplets {
            let id = d["id"]
                .as_i64()
                .ok_or_else(|| anyhow::anyhow!("no droplet id in create response"))?;
            let name = d["name"].as_str().unwrap_or_default().to_string();
            created.push(CreatedInstance {
                id: id.to_string(),
                name,
            });
        }
        Ok(created)
    }

    async fn get_instance_address(&self, id: &str) -> Result<Option<String>> {
        let url = format!("{}/droplets/{}", API_BASE, id);
        let resp = self.client.get(&url).headers(self.headers()).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "DigitalOcean get_instance_address failed: id={} status={} body={}",
                id,
                status.as_u16(),
                text
            ));
        }

        let body: serde_json::Value = resp.json().await?;
        let addr = body["droplet"]["networks"]["v4"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|n| n["type"].as_str() == Some("public"))
            .and_then(|n| n["ip_address"].as_str())
            .map(|s| s.to_string());
        Ok(addr)
    }

    async fn delete_instance(&self, id: &str) -> Result<bool> {
        let url = format!("{}/droplets/{}", API_BASE, id);
        let resp = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(
                id,
                status = status.as_u16(),
                body = %text,
                "droplet delete refused"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
