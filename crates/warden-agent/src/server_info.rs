use std::time::Duration;

use sysinfo::System;

const IPIFY_URL: &str = "https://api.ipify.org";
const IP_TIMEOUT: Duration = Duration::from_secs(5);
const CPU_SAMPLE: Duration = Duration::from_secs(1);
pub const IP_UNAVAILABLE: &str = "Unable to fetch IP";

#[derive(Debug, Clone, PartialEq)]
pub struct HostInfo {
    pub cpu_percent: f32,
    pub memory: String,
    pub external_ip: String,
}

pub async fn collect(http: &reqwest::Client) -> HostInfo {
    let (cpu_percent, memory) = sample_usage().await;
    HostInfo {
        cpu_percent,
        memory,
        external_ip: external_ip(http).await,
    }
}

async fn sample_usage() -> (f32, String) {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    tokio::time::sleep(CPU_SAMPLE.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();
    (
        sys.global_cpu_usage(),
        format_memory(sys.used_memory(), sys.total_memory()),
    )
}

pub fn format_memory(used_bytes: u64, total_bytes: u64) -> String {
    const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
    format!(
        "{:.1} GB / {:.1} GB",
        used_bytes as f64 / GIB,
        total_bytes as f64 / GIB
    )
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(IP_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "http client build failed; using defaults");
            reqwest::Client::new()
        })
}

async fn external_ip(http: &reqwest::Client) -> String {
    let res = async {
        http.get(IPIFY_URL)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
    .await;

    match res {
        Ok(ip) if !ip.trim().is_empty() => ip.trim().to_string(),
        Ok(_) => IP_UNAVAILABLE.to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "external ip lookup failed");
            IP_UNAVAILABLE.to_string()
        }
    }
}
