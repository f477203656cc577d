use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::CertificateData;
use crate::simulate::task::Task;

/// Labels shown while a certificate is "generated". They do not track any
/// real work.
pub const GENERATION_STEPS: &[&str] = &[
    "Collecting artwork metadata",
    "Fingerprinting record",
    "Anchoring hash",
    "Rendering verification QR code",
];

const SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub artwork_title: String,
    pub artist_name: String,
}

pub trait CertificateIssuer {
    fn issue(&self, request: &CertificateRequest) -> Task<CertificateData>;
}

/// Produces certificate-shaped identifiers after an artificial delay. There
/// is no signing and no ledger behind the hash.
pub struct SimulatedCertificateIssuer {
    verify_base_url: String,
    delay: Duration,
}

impl SimulatedCertificateIssuer {
    pub fn new(verify_base_url: &str, delay: Duration) -> Self {
        Self {
            verify_base_url: verify_base_url.trim_end_matches('/').to_string(),
            delay,
        }
    }
}

impl CertificateIssuer for SimulatedCertificateIssuer {
    fn issue(&self, request: &CertificateRequest) -> Task<CertificateData> {
        let base_url = self.verify_base_url.clone();
        let request = request.clone();
        Task::spawn("certificate generation", self.delay, move || {
            Ok(generate_certificate(&base_url, &request, Utc::now()))
        })
    }
}

pub fn generate_certificate(
    verify_base_url: &str,
    request: &CertificateRequest,
    now: DateTime<Utc>,
) -> CertificateData {
    let certificate_id = format!("COA-{}-{}", now.timestamp_millis(), random_suffix());
    CertificateData {
        qr_code_url: format!("{verify_base_url}/verify/{certificate_id}"),
        blockchain_hash: simulated_hash(request, now),
        certificate_id,
        generated_at: now,
    }
}

fn random_suffix() -> String {
    let mut value = Uuid::new_v4().as_u128();
    let radix = SUFFIX_ALPHABET.len() as u128;
    (0..SUFFIX_LEN)
        .map(|_| {
            let c = SUFFIX_ALPHABET[(value % radix) as usize] as char;
            value /= radix;
            c
        })
        .collect()
}

fn simulated_hash(request: &CertificateRequest, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(Uuid::new_v4().as_bytes());
    hasher.update(request.artwork_title.as_bytes());
    hasher.update(request.artist_name.as_bytes());
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}
