//! Authentication state of one token: PINs, retry counters and the
//! temporary passwords issued by successful authentication.
//!
//! User and Admin are tracked independently. Both may hold a live
//! temporary password at the same time.

use nk_otp_core::SecretBuffer;
use serde::{Deserialize, Serialize};

use crate::error::StatusCode;

/// Attempts a role gets before lockout.
pub const MAX_RETRIES: u8 = 3;

/// Shortest PIN accepted when changing or unblocking the user PIN.
pub const MIN_USER_PIN_LEN: usize = 6;

/// Shortest PIN accepted when changing the admin PIN.
pub const MIN_ADMIN_PIN_LEN: usize = 8;

/// Privilege level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Unauthenticated,
    User,
    Admin,
}

/// Failed-attempt budget of one role, in `0..=MAX_RETRIES`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryCounter(u8);

impl RetryCounter {
    #[must_use]
    pub const fn new() -> Self {
        Self(MAX_RETRIES)
    }

    #[must_use]
    pub const fn remaining(self) -> u8 {
        self.0
    }

    /// No attempts left. Even the correct PIN is refused.
    #[must_use]
    pub const fn is_locked(self) -> bool {
        self.0 == 0
    }

    pub fn record_failure(&mut self) {
        self.0 = self.0.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.0 = MAX_RETRIES;
    }
}

impl Default for RetryCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Credential handed out by a successful authentication.
#[derive(Clone, Debug)]
pub struct TemporaryPassword(SecretBuffer);

impl TemporaryPassword {
    #[must_use]
    pub const fn new(secret: SecretBuffer) -> Self {
        Self(secret)
    }

    /// Constant-time match. An empty presentation never matches.
    #[must_use]
    pub fn matches(&self, presented: &[u8]) -> bool {
        !presented.is_empty() && self.0.ct_eq(presented)
    }
}

#[derive(Debug)]
struct Credential {
    pin: SecretBuffer,
    retries: RetryCounter,
    temp: Option<TemporaryPassword>,
}

impl Credential {
    fn new(pin: SecretBuffer) -> Self {
        Self {
            pin,
            retries: RetryCounter::new(),
            temp: None,
        }
    }

    /// Check `pin`, spending one retry on failure.
    fn verify(&mut self, pin: &[u8]) -> Result<(), StatusCode> {
        if self.retries.is_locked() {
            return Err(StatusCode::WrongPassword);
        }
        if self.pin.ct_eq(pin) {
            self.retries.reset();
            Ok(())
        } else {
            self.retries.record_failure();
            Err(StatusCode::WrongPassword)
        }
    }

    fn authenticate(&mut self, pin: &[u8], temp: SecretBuffer) -> Result<(), StatusCode> {
        match self.verify(pin) {
            Ok(()) => {
                self.temp = Some(TemporaryPassword::new(temp));
                Ok(())
            }
            Err(status) => {
                self.temp = None;
                Err(status)
            }
        }
    }
}

/// Token-side authentication state machine.
#[derive(Debug)]
pub struct Session {
    admin: Credential,
    user: Credential,
}

impl Session {
    #[must_use]
    pub fn new(admin_pin: SecretBuffer, user_pin: SecretBuffer) -> Self {
        Self {
            admin: Credential::new(admin_pin),
            user: Credential::new(user_pin),
        }
    }

    const fn credential(&self, role: Role) -> Option<&Credential> {
        match role {
            Role::Admin => Some(&self.admin),
            Role::User => Some(&self.user),
            Role::Unauthenticated => None,
        }
    }

    fn credential_mut(&mut self, role: Role) -> Option<&mut Credential> {
        match role {
            Role::Admin => Some(&mut self.admin),
            Role::User => Some(&mut self.user),
            Role::Unauthenticated => None,
        }
    }

    /// Admin login. A failure also drops any live admin temporary password.
    ///
    /// # Errors
    ///
    /// `WrongPassword` for a wrong PIN or a locked admin role.
    pub fn first_authenticate(&mut self, pin: &[u8], temp: SecretBuffer) -> Result<(), StatusCode> {
        self.admin.authenticate(pin, temp)
    }

    /// User login, symmetric to [`first_authenticate`](Self::first_authenticate).
    ///
    /// # Errors
    ///
    /// `WrongPassword` for a wrong PIN or a locked user role.
    pub fn user_authenticate(&mut self, pin: &[u8], temp: SecretBuffer) -> Result<(), StatusCode> {
        self.user.authenticate(pin, temp)
    }

    /// Check a PIN outside a login, as the Password Safe and reset commands
    /// do. Counts against the role's retries.
    ///
    /// # Errors
    ///
    /// `WrongPassword`, or `NotAuthorized` for [`Role::Unauthenticated`].
    pub fn verify_pin(&mut self, role: Role, pin: &[u8]) -> Result<(), StatusCode> {
        self.credential_mut(role)
            .ok_or(StatusCode::NotAuthorized)?
            .verify(pin)
    }

    /// Restore a locked or forgotten user PIN with the admin PIN.
    ///
    /// # Errors
    ///
    /// `WrongPassword` (costs an admin retry) or `ErrorUnblockingPin` for a
    /// new PIN that is too short.
    pub fn unlock_user_password(
        &mut self,
        admin_pin: &[u8],
        new_user_pin: SecretBuffer,
    ) -> Result<(), StatusCode> {
        self.admin.verify(admin_pin)?;
        if new_user_pin.len() < MIN_USER_PIN_LEN {
            return Err(StatusCode::ErrorUnblockingPin);
        }
        self.user = Credential::new(new_user_pin);
        Ok(())
    }

    /// Replace a role's PIN. `old` must be the PIN, not a temporary password.
    ///
    /// # Errors
    ///
    /// `WrongPassword` (costs a retry), `ErrorChangingUserPassword` or
    /// `ErrorChangingAdminPassword` for a new PIN that is too short, and
    /// `NotAuthorized` for [`Role::Unauthenticated`].
    pub fn change_pin(&mut self, role: Role, old: &[u8], new: SecretBuffer) -> Result<(), StatusCode> {
        let (min_len, failure) = match role {
            Role::Admin => (MIN_ADMIN_PIN_LEN, StatusCode::ErrorChangingAdminPassword),
            Role::User => (MIN_USER_PIN_LEN, StatusCode::ErrorChangingUserPassword),
            Role::Unauthenticated => return Err(StatusCode::NotAuthorized),
        };
        let credential = self.credential_mut(role).ok_or(StatusCode::NotAuthorized)?;
        credential.verify(old)?;
        if new.len() < min_len {
            return Err(failure);
        }
        credential.pin = new;
        Ok(())
    }

    /// Check a presented temporary password against the live one for `role`.
    ///
    /// # Errors
    ///
    /// `NotAuthorized` when none is live or it does not match. Retry
    /// counters are never touched.
    pub fn authorize(&self, role: Role, presented: &[u8]) -> Result<(), StatusCode> {
        let live = self
            .credential(role)
            .and_then(|credential| credential.temp.as_ref())
            .ok_or(StatusCode::NotAuthorized)?;
        if live.matches(presented) {
            Ok(())
        } else {
            Err(StatusCode::NotAuthorized)
        }
    }

    /// Drop the live temporary password of `role`.
    pub fn invalidate(&mut self, role: Role) {
        if let Some(credential) = self.credential_mut(role) {
            credential.temp = None;
        }
    }

    #[must_use]
    pub fn is_authenticated(&self, role: Role) -> bool {
        self.credential(role)
            .is_some_and(|credential| credential.temp.is_some())
    }

    #[must_use]
    pub fn retry_count(&self, role: Role) -> u8 {
        self.credential(role)
            .map_or(0, |credential| credential.retries.remaining())
    }

    /// Back to factory PINs with full retries and nobody logged in.
    pub fn reset(&mut self, admin_pin: SecretBuffer, user_pin: SecretBuffer) {
        *self = Self::new(admin_pin, user_pin);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: &[u8] = b"12345678";
    const USER: &[u8] = b"123456";
    const ADMIN_TEMP: &[u8] = b"123123123";
    const USER_TEMP: &[u8] = b"234234234";

    fn session() -> Session {
        Session::new(SecretBuffer::new(ADMIN), SecretBuffer::new(USER))
    }

    #[test]
    fn fresh_session_is_unauthenticated() {
        let session = session();
        assert!(!session.is_authenticated(Role::Admin));
        assert!(!session.is_authenticated(Role::User));
        assert_eq!(session.retry_count(Role::Admin), 3);
        assert_eq!(session.retry_count(Role::User), 3);
        assert_eq!(
            session.authorize(Role::Admin, ADMIN_TEMP),
            Err(StatusCode::NotAuthorized)
        );
    }

    #[test]
    fn admin_login_issues_temporary_password() {
        let mut session = session();
        session
            .first_authenticate(ADMIN, SecretBuffer::new(ADMIN_TEMP))
            .unwrap();
        assert!(session.is_authenticated(Role::Admin));
        assert!(!session.is_authenticated(Role::User));
        assert!(session.authorize(Role::Admin, ADMIN_TEMP).is_ok());
        assert_eq!(
            session.authorize(Role::Admin, b"other"),
            Err(StatusCode::NotAuthorized)
        );
        assert_eq!(
            session.authorize(Role::User, ADMIN_TEMP),
            Err(StatusCode::NotAuthorized),
            "admin temp is not a user temp"
        );
    }

    #[test]
    fn roles_are_independent() {
        let mut session = session();
        session
            .first_authenticate(ADMIN, SecretBuffer::new(ADMIN_TEMP))
            .unwrap();
        session
            .user_authenticate(USER, SecretBuffer::new(USER_TEMP))
            .unwrap();
        assert!(session.authorize(Role::Admin, ADMIN_TEMP).is_ok());
        assert!(session.authorize(Role::User, USER_TEMP).is_ok());
        session.invalidate(Role::Admin);
        assert!(session.authorize(Role::User, USER_TEMP).is_ok());
        assert!(!session.is_authenticated(Role::Admin));
        assert!(session.is_authenticated(Role::User));
    }

    #[test]
    fn failures_count_down_to_lockout() {
        let mut session = session();
        for expected in [2, 1, 0, 0] {
            assert_eq!(
                session.first_authenticate(b"wrong", SecretBuffer::new(ADMIN_TEMP)),
                Err(StatusCode::WrongPassword)
            );
            assert_eq!(session.retry_count(Role::Admin), expected);
        }
        assert_eq!(
            session.first_authenticate(ADMIN, SecretBuffer::new(ADMIN_TEMP)),
            Err(StatusCode::WrongPassword),
            "locked role refuses the correct PIN"
        );
        assert_eq!(session.retry_count(Role::Admin), 0);
    }

    #[test]
    fn success_restores_retries() {
        let mut session = session();
        let _ = session.user_authenticate(b"wrong", SecretBuffer::new(USER_TEMP));
        let _ = session.user_authenticate(b"wrong", SecretBuffer::new(USER_TEMP));
        assert_eq!(session.retry_count(Role::User), 1);
        session
            .user_authenticate(USER, SecretBuffer::new(USER_TEMP))
            .unwrap();
        assert_eq!(session.retry_count(Role::User), 3);
    }

    #[test]
    fn failed_login_drops_live_temporary_password() {
        let mut session = session();
        session
            .first_authenticate(ADMIN, SecretBuffer::new(ADMIN_TEMP))
            .unwrap();
        let _ = session.first_authenticate(b"wrong", SecretBuffer::new(b"x"));
        assert_eq!(
            session.authorize(Role::Admin, ADMIN_TEMP),
            Err(StatusCode::NotAuthorized)
        );
    }

    #[test]
    fn empty_temporary_password_never_authorizes() {
        let mut session = session();
        session
            .user_authenticate(USER, SecretBuffer::new(&[]))
            .unwrap();
        assert_eq!(
            session.authorize(Role::User, b""),
            Err(StatusCode::NotAuthorized)
        );
    }

    #[test]
    fn unlock_resets_user_and_costs_admin() {
        let mut session = session();
        for _ in 0..3 {
            let _ = session.change_pin(Role::User, b"wrong", SecretBuffer::new(b"123123123"));
        }
        assert_eq!(session.retry_count(Role::User), 0);
        assert_eq!(
            session.unlock_user_password(b"wrong", SecretBuffer::new(USER)),
            Err(StatusCode::WrongPassword)
        );
        assert_eq!(session.retry_count(Role::Admin), 2);
        session
            .unlock_user_password(ADMIN, SecretBuffer::new(b"654321"))
            .unwrap();
        assert_eq!(session.retry_count(Role::User), 3);
        assert_eq!(session.retry_count(Role::Admin), 3);
        assert!(session.verify_pin(Role::User, b"654321").is_ok());
    }

    #[test]
    fn unlock_rejects_short_pin() {
        let mut session = session();
        assert_eq!(
            session.unlock_user_password(ADMIN, SecretBuffer::new(b"123")),
            Err(StatusCode::ErrorUnblockingPin)
        );
    }

    #[test]
    fn change_pin_requires_old_pin() {
        let mut session = session();
        assert_eq!(
            session.change_pin(Role::Admin, b"wrong", SecretBuffer::new(b"123123123")),
            Err(StatusCode::WrongPassword)
        );
        assert_eq!(session.retry_count(Role::Admin), 2);
        session
            .change_pin(Role::Admin, ADMIN, SecretBuffer::new(b"123123123"))
            .unwrap();
        assert_eq!(session.retry_count(Role::Admin), 3);
        assert!(session.verify_pin(Role::Admin, b"123123123").is_ok());
        assert_eq!(
            session.verify_pin(Role::Admin, ADMIN),
            Err(StatusCode::WrongPassword)
        );
    }

    #[test]
    fn change_pin_enforces_minimum_length() {
        let mut session = session();
        assert_eq!(
            session.change_pin(Role::User, USER, SecretBuffer::new(b"12")),
            Err(StatusCode::ErrorChangingUserPassword)
        );
        assert_eq!(
            session.change_pin(Role::Admin, ADMIN, SecretBuffer::new(b"1234567")),
            Err(StatusCode::ErrorChangingAdminPassword)
        );
    }

    #[test]
    fn unauthenticated_role_has_no_credential() {
        let mut session = session();
        assert_eq!(
            session.verify_pin(Role::Unauthenticated, b""),
            Err(StatusCode::NotAuthorized)
        );
        assert_eq!(session.retry_count(Role::Unauthenticated), 0);
    }

    #[test]
    fn reset_restores_factory_pins() {
        let mut session = session();
        session
            .change_pin(Role::User, USER, SecretBuffer::new(b"999999"))
            .unwrap();
        let _ = session.first_authenticate(b"wrong", SecretBuffer::new(ADMIN_TEMP));
        session.reset(SecretBuffer::new(ADMIN), SecretBuffer::new(USER));
        assert_eq!(session.retry_count(Role::Admin), 3);
        assert!(session.verify_pin(Role::User, USER).is_ok());
    }
}
