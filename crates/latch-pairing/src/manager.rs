//! Pairing session lifecycle and the typed operations the local endpoints
//! call.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

use latch_auth::{AuthManager, TokenPayload, UserInfo};
use latch_provider::{Clock, TaskRunner};

use crate::exchanger::KeyExchanger;
use crate::throttle::PairingThrottle;
use crate::{CryptoType, PairingConfig, PairingError, PairingMode, PairingResult};

type HmacSha256 = Hmac<Sha256>;

/// How long a pending session waits for its confirmation.
const PENDING_SESSION_TTL: Duration = Duration::from_secs(5 * 60);
/// How long a confirmed session stays usable for pairing-code checks.
const CONFIRMED_SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// Observer of successful session starts; receives the live pairing code so
/// a UI can display it.
pub type SessionStartedCallback = Box<dyn Fn(&str, PairingMode, &[u8]) + Send + Sync>;
/// Observer of pending-session closes.
pub type SessionEndedCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Result of a successful start: the session handle and the device's first
/// protocol message, Base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPairingResponse {
    /// Freshly allocated session id.
    pub session_id: String,
    /// Base64 of the device's key-exchange commitment.
    pub device_commitment: String,
}

/// Result of a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmPairingResponse {
    /// Base64 SHA-256 fingerprint of the device TLS certificate.
    pub certificate_fingerprint: String,
    /// Base64 HMAC of the fingerprint under the freshly derived session key.
    pub signature: String,
}

struct SessionTable {
    pending: HashMap<String, KeyExchanger>,
    confirmed: HashMap<String, KeyExchanger>,
    throttle: PairingThrottle,
}

struct Shared {
    auth: Arc<AuthManager>,
    config: PairingConfig,
    clock: Arc<dyn Clock>,
    runner: Arc<dyn TaskRunner>,
    sessions: Mutex<SessionTable>,
    started_listeners: Mutex<Vec<SessionStartedCallback>>,
    ended_listeners: Mutex<Vec<SessionEndedCallback>>,
}

impl Shared {
    /// Remove a pending session and fire the ended listeners if it was
    /// actually there. Safe to call for ids long gone.
    fn close_pending(&self, session_id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap()
            .pending
            .remove(session_id)
            .is_some();
        if removed {
            self.notify_ended(session_id);
        }
        removed
    }

    fn close_confirmed(&self, session_id: &str) -> bool {
        self.sessions
            .lock()
            .unwrap()
            .confirmed
            .remove(session_id)
            .is_some()
    }

    fn notify_ended(&self, session_id: &str) {
        let listeners = self.ended_listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(session_id);
        }
    }

    fn notify_started(&self, session_id: &str, mode: PairingMode, code: &[u8]) {
        let listeners = self.started_listeners.lock().unwrap();
        for listener in listeners.iter() {
            listener(session_id, mode, code);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let ended: Vec<String> = self
            .sessions
            .get_mut()
            .unwrap()
            .pending
            .drain()
            .map(|(session_id, _)| session_id)
            .collect();
        let listeners = self.ended_listeners.get_mut().unwrap();
        for session_id in &ended {
            for listener in listeners.iter() {
                listener(session_id);
            }
        }
    }
}

/// Pairing engine: key exchange with local clients, session tables with
/// expiry timers, brute-force throttling, and the token facade.
///
/// All mutation is serialized through one internal lock; listeners are
/// invoked with no session lock held. Expiry timers hold only a weak handle
/// and a session id, so a timer outliving the engine or its session is a
/// no-op.
pub struct PairingManager {
    shared: Arc<Shared>,
}

impl PairingManager {
    /// Build the engine over a validated configuration.
    pub fn new(
        auth: Arc<AuthManager>,
        config: PairingConfig,
        clock: Arc<dyn Clock>,
        runner: Arc<dyn TaskRunner>,
    ) -> PairingResult<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                auth,
                config,
                clock,
                runner,
                sessions: Mutex::new(SessionTable {
                    pending: HashMap::new(),
                    confirmed: HashMap::new(),
                    throttle: PairingThrottle::default(),
                }),
                started_listeners: Mutex::new(Vec::new()),
                ended_listeners: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Pairing modes clients may request.
    pub fn pairing_modes(&self) -> BTreeSet<PairingMode> {
        self.shared.config.pairing_modes.clone()
    }

    /// Crypto types clients may request. Plaintext shows up only while
    /// security is disabled.
    pub fn crypto_types(&self) -> BTreeSet<CryptoType> {
        let mut types = BTreeSet::from([CryptoType::Spake2]);
        if self.shared.config.security_disabled {
            types.insert(CryptoType::None);
        }
        types
    }

    /// Register an observer for successful session starts.
    pub fn on_session_started(&self, listener: SessionStartedCallback) {
        self.shared.started_listeners.lock().unwrap().push(listener);
    }

    /// Register an observer for pending-session closes.
    pub fn on_session_ended(&self, listener: SessionEndedCallback) {
        self.shared.ended_listeners.lock().unwrap().push(listener);
    }

    /// Open a pairing session.
    ///
    /// Accounts a throttle attempt, materializes the pairing code for `mode`,
    /// seeds a key exchanger for `crypto`, closes any other pending session,
    /// and schedules the new session's expiry.
    pub fn start_pairing(
        &self,
        mode: PairingMode,
        crypto: CryptoType,
    ) -> PairingResult<StartPairingResponse> {
        let shared = &self.shared;
        let now = shared.clock.now();

        let (session_id, device_commitment, code, ended) = {
            let mut sessions = shared.sessions.lock().unwrap();

            if !shared.config.security_disabled {
                sessions.throttle.check(now)?;
            }

            if !shared.config.pairing_modes.contains(&mode) {
                return Err(PairingError::InvalidParams(
                    "pairing mode is not enabled".to_string(),
                ));
            }

            let code = match mode {
                PairingMode::EmbeddedCode => {
                    if shared.config.embedded_code.is_empty() {
                        return Err(PairingError::InvalidParams(
                            "no embedded code configured".to_string(),
                        ));
                    }
                    shared.config.embedded_code.clone()
                }
                PairingMode::PinCode => {
                    format!("{:04}", rand::thread_rng().gen_range(0..=9999))
                }
                PairingMode::Ultrasound32 | PairingMode::Audible32 => {
                    return Err(PairingError::InvalidParams(
                        "unsupported pairing mode".to_string(),
                    ));
                }
            };

            let exchanger = match crypto {
                CryptoType::Spake2 => KeyExchanger::spake(&code),
                CryptoType::None if shared.config.security_disabled => {
                    KeyExchanger::insecure(&code)
                }
                CryptoType::None => {
                    return Err(PairingError::InvalidParams(
                        "unsupported crypto".to_string(),
                    ));
                }
            };

            // One pending session at a time.
            let ended: Vec<String> = sessions.pending.drain().map(|(id, _)| id).collect();

            let session_id = loop {
                let candidate = Uuid::new_v4().to_string();
                if !sessions.pending.contains_key(&candidate)
                    && !sessions.confirmed.contains_key(&candidate)
                {
                    break candidate;
                }
            };

            let device_commitment = BASE64.encode(exchanger.first_message());
            sessions.pending.insert(session_id.clone(), exchanger);
            (session_id, device_commitment, code, ended)
        };

        for old in &ended {
            shared.notify_ended(old);
        }

        Self::schedule_pending_expiry(shared, session_id.clone());

        info!(session_id = %session_id, ?mode, "pairing session started");
        shared.notify_started(&session_id, mode, code.as_bytes());

        Ok(StartPairingResponse {
            session_id,
            device_commitment,
        })
    }

    /// Complete the key exchange for a pending session.
    ///
    /// On success the session is promoted to confirmed with a fresh TTL and
    /// the response carries the certificate fingerprint plus its HMAC under
    /// the derived key. Every failure past the session lookup closes the
    /// session.
    pub fn confirm_pairing(
        &self,
        session_id: &str,
        client_commitment: &str,
    ) -> PairingResult<ConfirmPairingResponse> {
        let shared = &self.shared;

        let response = {
            let mut sessions = shared.sessions.lock().unwrap();
            if !sessions.pending.contains_key(session_id) {
                return Err(PairingError::UnknownSession(session_id.to_string()));
            }

            let commitment = match BASE64.decode(client_commitment) {
                Ok(commitment) => commitment,
                Err(_) => {
                    sessions.pending.remove(session_id);
                    drop(sessions);
                    shared.notify_ended(session_id);
                    warn!(session_id = %session_id, "client commitment is not valid Base64");
                    return Err(PairingError::InvalidFormat(client_commitment.to_string()));
                }
            };

            let mut exchanger = sessions
                .pending
                .remove(session_id)
                .ok_or_else(|| PairingError::UnknownSession(session_id.to_string()))?;

            let key = match exchanger.process_peer(&commitment) {
                Ok(key) => key.to_vec(),
                Err(source) => {
                    drop(sessions);
                    shared.notify_ended(session_id);
                    warn!(session_id = %session_id, "key exchange rejected client commitment");
                    return Err(PairingError::CommitmentMismatch {
                        source: Box::new(source),
                    });
                }
            };

            let fingerprint = shared.auth.certificate_fingerprint();
            let signature = hmac_sha256(&key, fingerprint);

            sessions
                .confirmed
                .insert(session_id.to_string(), exchanger);

            ConfirmPairingResponse {
                certificate_fingerprint: BASE64.encode(fingerprint),
                signature: BASE64.encode(signature),
            }
        };

        // Promotion closes the pending slot.
        shared.notify_ended(session_id);
        Self::schedule_confirmed_expiry(shared, session_id.to_string());

        info!(session_id = %session_id, "pairing session confirmed");
        Ok(response)
    }

    /// Check a client's proof that it derived a live session key.
    ///
    /// The proof is Base64 of `HMAC-SHA256(session_key, session_id)`. A match
    /// forgives all throttled attempts. The matched session stays resident
    /// until its TTL, so the proof may be replayed within the window.
    pub fn is_valid_pairing_code(&self, auth_code: &str) -> bool {
        if self.shared.config.security_disabled {
            return true;
        }
        let decoded = match BASE64.decode(auth_code) {
            Ok(decoded) => decoded,
            Err(_) => return false,
        };

        let mut sessions = self.shared.sessions.lock().unwrap();
        let mut matched = false;
        for (session_id, exchanger) in &sessions.confirmed {
            let Some(key) = exchanger.key() else {
                continue;
            };
            let expected = hmac_sha256(key, session_id.as_bytes());
            if bool::from(decoded.ct_eq(&expected)) {
                debug!(session_id = %session_id, "pairing code accepted");
                matched = true;
                break;
            }
        }
        if matched {
            sessions.throttle.reset();
            return true;
        }
        warn!("attempt to authenticate with an invalid pairing code");
        false
    }

    /// Tear down a session in either state.
    ///
    /// Cancelling a still-pending session gives its throttle attempt back.
    pub fn cancel_pairing(&self, session_id: &str) -> PairingResult<()> {
        let shared = &self.shared;
        let (pending, confirmed) = {
            let mut sessions = shared.sessions.lock().unwrap();
            let confirmed = sessions.confirmed.remove(session_id).is_some();
            let pending = sessions.pending.remove(session_id).is_some();
            if pending {
                sessions.throttle.rollback_attempt();
            }
            (pending, confirmed)
        };

        if pending {
            shared.notify_ended(session_id);
        }
        if pending || confirmed {
            info!(session_id = %session_id, "pairing session cancelled");
            Ok(())
        } else {
            Err(PairingError::UnknownSession(session_id.to_string()))
        }
    }

    /// Mint a wire-form access token for a paired caller.
    pub fn create_access_token(&self, user: &UserInfo, issued_at: DateTime<Utc>) -> String {
        self.shared.auth.create_access_token_b64(user, issued_at)
    }

    /// Verify and decode a wire-form access token. Failures collapse to the
    /// anonymous sentinel payload.
    pub fn parse_access_token(&self, token: &str) -> TokenPayload {
        self.shared.auth.parse_access_token_b64(token)
    }

    fn schedule_pending_expiry(shared: &Arc<Shared>, session_id: String) {
        let weak: Weak<Shared> = Arc::downgrade(shared);
        shared.runner.post_delayed(
            PENDING_SESSION_TTL,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    if shared.close_pending(&session_id) {
                        debug!(session_id = %session_id, "pending pairing session expired");
                    }
                }
            }),
        );
    }

    fn schedule_confirmed_expiry(shared: &Arc<Shared>, session_id: String) {
        let weak: Weak<Shared> = Arc::downgrade(shared);
        shared.runner.post_delayed(
            CONFIRMED_SESSION_TTL,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    if shared.close_confirmed(&session_id) {
                        debug!(session_id = %session_id, "confirmed pairing session expired");
                    }
                }
            }),
        );
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchanger::{CLIENT_IDENTITY, DEVICE_IDENTITY};
    use latch_auth::AuthScope;
    use latch_provider::testing::{FakeClock, FakeTaskRunner};
    use spake2::{Ed25519Group, Identity, Password, Spake2};
    use std::collections::BTreeSet;

    struct Fixture {
        clock: Arc<FakeClock>,
        runner: Arc<FakeTaskRunner>,
        manager: PairingManager,
    }

    fn fixture(config: PairingConfig) -> Fixture {
        let clock = Arc::new(FakeClock::at_timestamp(1_450_000_000));
        let runner = Arc::new(FakeTaskRunner::new(clock.clone()));
        let auth = Arc::new(AuthManager::new(
            [1u8; 32],
            [2u8; 32],
            b"device-certificate",
            clock.clone(),
        ));
        let manager =
            PairingManager::new(auth, config, clock.clone(), runner.clone()).unwrap();
        Fixture {
            clock,
            runner,
            manager,
        }
    }

    fn embedded_config() -> PairingConfig {
        PairingConfig {
            pairing_modes: BTreeSet::from([PairingMode::EmbeddedCode]),
            embedded_code: "1234".to_string(),
            security_disabled: false,
        }
    }

    /// Run the client (initiator) side against a started session.
    fn client_exchange(code: &str, device_commitment_b64: &str) -> (Vec<u8>, String) {
        let (client, client_msg) = Spake2::<Ed25519Group>::start_a(
            &Password::new(code.as_bytes()),
            &Identity::new(CLIENT_IDENTITY),
            &Identity::new(DEVICE_IDENTITY),
        );
        let device_msg = BASE64.decode(device_commitment_b64).unwrap();
        let client_key = client.finish(&device_msg).unwrap();
        (client_key, BASE64.encode(client_msg))
    }

    fn pairing_proof(client_key: &[u8], session_id: &str) -> String {
        BASE64.encode(hmac_sha256(client_key, session_id.as_bytes()))
    }

    #[test]
    fn embedded_code_pairing_round_trip() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        // Two failed starts first so the reset is observable below.
        manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();

        // Third attempt: this one is completed. It also arms the block.
        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        let (client_key, client_commitment) =
            client_exchange("1234", &started.device_commitment);

        let confirmed = manager
            .confirm_pairing(&started.session_id, &client_commitment)
            .unwrap();

        // Device signed its certificate fingerprint with the shared key.
        let fingerprint = BASE64.decode(&confirmed.certificate_fingerprint).unwrap();
        let expected = BASE64.encode(hmac_sha256(&client_key, &fingerprint));
        assert_eq!(confirmed.signature, expected);

        // Proof of key possession is accepted and forgives the throttle.
        assert!(manager.is_valid_pairing_code(&pairing_proof(&client_key, &started.session_id)));
        manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .expect("throttle was reset by the accepted pairing code");
    }

    #[test]
    fn wrong_code_surfaces_at_the_mac_check() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        let (client_key, client_commitment) =
            client_exchange("9999", &started.device_commitment);

        // SPAKE2 cannot tell a wrong password apart at this point; the
        // confirmation succeeds with a key the client does not share.
        let confirmed = manager
            .confirm_pairing(&started.session_id, &client_commitment)
            .unwrap();
        let fingerprint = BASE64.decode(&confirmed.certificate_fingerprint).unwrap();
        let from_client = BASE64.encode(hmac_sha256(&client_key, &fingerprint));
        assert_ne!(confirmed.signature, from_client);

        assert!(!manager.is_valid_pairing_code(&pairing_proof(&client_key, &started.session_id)));
    }

    #[test]
    fn fourth_start_is_blocked() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        for _ in 0..3 {
            manager
                .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
                .unwrap();
        }
        let err = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap_err();
        assert_eq!(err.code(), "deviceBusy");

        // The block lapses after a minute.
        fixture.clock.advance(Duration::from_secs(61));
        manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
    }

    #[test]
    fn unknown_session_is_rejected() {
        let fixture = fixture(embedded_config());
        let err = fixture
            .manager
            .confirm_pairing("no-such-session", "aaaa")
            .unwrap_err();
        assert_eq!(err.code(), "unknownSession");
    }

    #[test]
    fn bad_base64_commitment_closes_the_session() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_clone = ended.clone();
        manager.on_session_ended(Box::new(move |id| {
            ended_clone.lock().unwrap().push(id.to_string());
        }));

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        let err = manager
            .confirm_pairing(&started.session_id, "!!not base64!!")
            .unwrap_err();
        assert_eq!(err.code(), "invalidFormat");
        assert_eq!(*ended.lock().unwrap(), vec![started.session_id.clone()]);

        // Session is gone for good.
        let err = manager.confirm_pairing(&started.session_id, "aaaa").unwrap_err();
        assert_eq!(err.code(), "unknownSession");
    }

    #[test]
    fn malformed_commitment_is_a_mismatch() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();

        let garbage = BASE64.encode([0u8; 3]);
        let err = manager
            .confirm_pairing(&started.session_id, &garbage)
            .unwrap_err();
        assert_eq!(err.code(), "commitmentMismatch");
    }

    #[test]
    fn only_one_pending_session_survives() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_clone = ended.clone();
        manager.on_session_ended(Box::new(move |id| {
            ended_clone.lock().unwrap().push(id.to_string());
        }));

        let first = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        let second = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();

        assert_eq!(*ended.lock().unwrap(), vec![first.session_id.clone()]);

        let err = manager.confirm_pairing(&first.session_id, "aaaa").unwrap_err();
        assert_eq!(err.code(), "unknownSession");

        let (_, client_commitment) = client_exchange("1234", &second.device_commitment);
        manager
            .confirm_pairing(&second.session_id, &client_commitment)
            .unwrap();
    }

    #[test]
    fn pending_session_expires_after_ttl() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_clone = ended.clone();
        manager.on_session_ended(Box::new(move |id| {
            ended_clone.lock().unwrap().push(id.to_string());
        }));

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();

        fixture.clock.advance(Duration::from_secs(5 * 60));
        fixture.runner.run_due();

        assert_eq!(*ended.lock().unwrap(), vec![started.session_id.clone()]);
        let err = manager.confirm_pairing(&started.session_id, "aaaa").unwrap_err();
        assert_eq!(err.code(), "unknownSession");
    }

    #[test]
    fn confirmed_session_expires_after_ttl() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        let (client_key, client_commitment) =
            client_exchange("1234", &started.device_commitment);
        manager
            .confirm_pairing(&started.session_id, &client_commitment)
            .unwrap();

        let proof = pairing_proof(&client_key, &started.session_id);
        assert!(manager.is_valid_pairing_code(&proof));
        // Replays inside the TTL are accepted; the session is not consumed.
        assert!(manager.is_valid_pairing_code(&proof));

        fixture.clock.advance(Duration::from_secs(5 * 60));
        fixture.runner.run_due();
        assert!(!manager.is_valid_pairing_code(&proof));
    }

    #[test]
    fn expiry_timer_after_cancel_is_a_noop() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_clone = ended.clone();
        manager.on_session_ended(Box::new(move |id| {
            ended_clone.lock().unwrap().push(id.to_string());
        }));

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        manager.cancel_pairing(&started.session_id).unwrap();
        assert_eq!(ended.lock().unwrap().len(), 1);

        fixture.clock.advance(Duration::from_secs(5 * 60));
        fixture.runner.run_due();
        // The stale timer found nothing to close; no second event.
        assert_eq!(ended.lock().unwrap().len(), 1);
    }

    #[test]
    fn cancelling_pending_returns_the_throttle_attempt() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        manager.cancel_pairing(&started.session_id).unwrap();

        // Cancel gave one attempt back: three more starts succeed.
        for _ in 0..3 {
            manager
                .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
                .unwrap();
        }
        assert_eq!(
            manager
                .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
                .unwrap_err()
                .code(),
            "deviceBusy"
        );
    }

    #[test]
    fn cancel_of_unknown_session_is_rejected() {
        let fixture = fixture(embedded_config());
        let err = fixture.manager.cancel_pairing("no-such-session").unwrap_err();
        assert_eq!(err.code(), "unknownSession");
    }

    #[test]
    fn disabled_modes_and_crypto_are_rejected() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;

        let err = manager
            .start_pairing(PairingMode::PinCode, CryptoType::Spake2)
            .unwrap_err();
        assert_eq!(err.code(), "invalidParams");

        let err = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::None)
            .unwrap_err();
        assert_eq!(err.code(), "invalidParams");
    }

    #[test]
    fn acoustic_modes_are_advertised_but_not_startable() {
        let mut config = embedded_config();
        config.pairing_modes.insert(PairingMode::Ultrasound32);
        let fixture = fixture(config);

        assert!(fixture
            .manager
            .pairing_modes()
            .contains(&PairingMode::Ultrasound32));
        let err = fixture
            .manager
            .start_pairing(PairingMode::Ultrasound32, CryptoType::Spake2)
            .unwrap_err();
        assert_eq!(err.code(), "invalidParams");
    }

    #[test]
    fn pin_mode_hands_the_code_to_listeners() {
        let fixture = fixture(PairingConfig::default());
        let manager = &fixture.manager;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        manager.on_session_started(Box::new(move |id, mode, code| {
            seen_clone
                .lock()
                .unwrap()
                .push((id.to_string(), mode, code.to_vec()));
        }));

        let started = manager
            .start_pairing(PairingMode::PinCode, CryptoType::Spake2)
            .unwrap();

        let seen = seen.lock().unwrap();
        let (id, mode, code) = &seen[0];
        assert_eq!(id, &started.session_id);
        assert_eq!(*mode, PairingMode::PinCode);
        assert_eq!(code.len(), 4);
        assert!(code.iter().all(u8::is_ascii_digit));
    }

    #[test]
    fn security_disabled_allows_plaintext_and_skips_checks() {
        let config = PairingConfig {
            pairing_modes: BTreeSet::from([PairingMode::EmbeddedCode]),
            embedded_code: "1234".to_string(),
            security_disabled: true,
        };
        let fixture = fixture(config);
        let manager = &fixture.manager;

        assert!(manager.crypto_types().contains(&CryptoType::None));

        // No throttle: far more than three starts go through.
        for _ in 0..10 {
            manager
                .start_pairing(PairingMode::EmbeddedCode, CryptoType::None)
                .unwrap();
        }

        let started = manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::None)
            .unwrap();
        // Plaintext exchanger echoes the code as its commitment.
        assert_eq!(
            BASE64.decode(&started.device_commitment).unwrap(),
            b"1234"
        );

        // Any proof passes while security is off.
        assert!(manager.is_valid_pairing_code("anything-at-all"));
    }

    #[test]
    fn plaintext_crypto_needs_the_backdoor() {
        let fixture = fixture(PairingConfig::default());
        let err = fixture
            .manager
            .start_pairing(PairingMode::PinCode, CryptoType::None)
            .unwrap_err();
        assert_eq!(err.code(), "invalidParams");
        assert!(!fixture.manager.crypto_types().contains(&CryptoType::None));
    }

    #[test]
    fn drop_closes_pending_sessions() {
        let fixture = fixture(embedded_config());
        let ended = Arc::new(Mutex::new(Vec::new()));
        let ended_clone = ended.clone();
        fixture.manager.on_session_ended(Box::new(move |id| {
            ended_clone.lock().unwrap().push(id.to_string());
        }));

        let started = fixture
            .manager
            .start_pairing(PairingMode::EmbeddedCode, CryptoType::Spake2)
            .unwrap();
        drop(fixture.manager);
        assert_eq!(*ended.lock().unwrap(), vec![started.session_id]);
    }

    #[test]
    fn token_facade_round_trips() {
        let fixture = fixture(embedded_config());
        let manager = &fixture.manager;
        let user = UserInfo::new(AuthScope::User, 11);
        let issued_at = fixture.clock.now();

        let token = manager.create_access_token(&user, issued_at);
        let parsed = manager.parse_access_token(&token);
        assert_eq!(parsed.user, user);
        assert_eq!(parsed.issued_at.timestamp(), issued_at.timestamp());

        assert!(manager.parse_access_token("not-a-token").is_anonymous());
    }

    #[test]
    fn inconsistent_config_is_rejected_at_construction() {
        let clock = Arc::new(FakeClock::new());
        let runner = Arc::new(FakeTaskRunner::new(clock.clone()));
        let auth = Arc::new(AuthManager::new([1u8; 32], [2u8; 32], b"cert", clock.clone()));
        let config = PairingConfig {
            pairing_modes: BTreeSet::from([PairingMode::EmbeddedCode]),
            embedded_code: String::new(),
            security_disabled: false,
        };
        assert!(PairingManager::new(auth, config, clock, runner).is_err());
    }
}
