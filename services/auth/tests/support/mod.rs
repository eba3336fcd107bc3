#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use auth::config::AuthConfig;
use auth::models::{Job, User};
use auth::queue::JobQueue;
use auth::repositories::InMemoryStore;
use auth::session::SessionManager;
use auth::signature::{address_from_key, hash_personal_message};
use auth::signup::SignupService;
use common::cache::MemoryCache;
use k256::ecdsa::SigningKey;

pub struct Pipeline {
    pub service: SignupService,
    pub store: InMemoryStore,
    pub cache: MemoryCache,
    pub queue: JobQueue,
}

pub fn pipeline() -> Pipeline {
    let store = InMemoryStore::new();
    let cache = MemoryCache::new();
    let queue = JobQueue::new(Arc::new(store.clone()));
    let service = SignupService::new(
        Arc::new(store.clone()),
        SessionManager::new(Arc::new(cache.clone())),
        queue.clone(),
        AuthConfig::default(),
    )
    .expect("in-memory store supports transactions");

    Pipeline {
        service,
        store,
        cache,
        queue,
    }
}

/// Wait for detached enqueues to land
pub async fn wait_for_jobs(store: &InMemoryStore, count: usize) -> Vec<Job> {
    for _ in 0..100 {
        let jobs = store.jobs().await;
        if jobs.len() >= count {
            return jobs;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.jobs().await
}

/// Raw token carried by a magic link email job
pub fn token_from(job: &Job) -> String {
    let url = job.payload["magic_link_url"]
        .as_str()
        .expect("payload has a magic link url");
    url.split("token=")
        .nth(1)
        .expect("url carries a token")
        .to_string()
}

pub fn wallet(seed: u8) -> SigningKey {
    let mut secret = [0x11u8; 32];
    secret[31] = seed;
    SigningKey::from_slice(&secret).expect("valid test key")
}

pub fn address_of(key: &SigningKey) -> String {
    address_from_key(key.verifying_key())
}

/// Personal-message signature with `v` in {27, 28}
pub fn sign(key: &SigningKey, message: &str) -> String {
    let digest = hash_personal_message(message);
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(&digest)
        .expect("signing succeeds");
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    format!("0x{}", hex::encode(bytes))
}

/// Sign up and verify an email, returning the signup session id
pub async fn verified_session(p: &Pipeline, full_name: &str, email: &str) -> String {
    let before = p.store.jobs().await.len();
    p.service
        .create_pending_signup(full_name, email, None)
        .await
        .expect("signup accepted");
    let jobs = wait_for_jobs(&p.store, before + 1).await;
    let token = token_from(jobs.last().expect("email job queued"));

    let verified = p.service.verify_token(&token).await.expect("token valid");
    assert!(verified.needs_wallet);
    verified.session_id
}

/// Run the whole signup flow for `email` with the wallet derived from `seed`
pub async fn register(p: &Pipeline, email: &str, seed: u8) -> (User, String) {
    let session_id = verified_session(p, "Jane Doe", email).await;
    let key = wallet(seed);
    let address = address_of(&key);

    let nonce = p
        .service
        .generate_nonce(&session_id, &address, None)
        .await
        .expect("nonce issued");
    let signature = sign(&key, &nonce.message);

    let done = p
        .service
        .complete_signup(&session_id, &address, &signature, &nonce.message)
        .await
        .expect("signup completes");
    (done.user, done.session_id)
}
