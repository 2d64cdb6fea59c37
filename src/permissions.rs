//! Request-level and object-level permission policies.
//!
//! A policy answers two questions: may this principal perform this class of
//! operation at all (`has_permission`), and may it perform it on this
//! particular entity (`has_object_permission`). The object check only runs
//! after the collection check has passed; [`check`] enforces that order.

use spin_sdk::http::Method;
use tracing::warn;

use crate::core::errors::ApiError;
use crate::models::models::{Comment, Post, User};

/// The acting party of a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User {
        id: u64,
        username: String,
        is_superuser: bool,
    },
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Principal::User {
            id: user.id,
            username: user.username.clone(),
            is_superuser: user.is_superuser,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Principal::User { .. })
    }

    /// Always false for anonymous principals.
    pub fn is_superuser(&self) -> bool {
        match self {
            Principal::User { is_superuser, .. } => *is_superuser,
            Principal::Anonymous => false,
        }
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            Principal::User { id, .. } => Some(*id),
            Principal::Anonymous => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodClass {
    ReadOnly,
    Mutating,
}

impl MethodClass {
    /// GET, HEAD and OPTIONS are read-only; every other verb mutates.
    pub fn of(method: &Method) -> Self {
        match method {
            Method::Get | Method::Head | Method::Options => MethodClass::ReadOnly,
            _ => MethodClass::Mutating,
        }
    }
}

/// Anything with a single owning user.
pub trait Owned {
    fn owner_id(&self) -> u64;
}

impl Owned for Post {
    fn owner_id(&self) -> u64 {
        self.owner
    }
}

impl Owned for Comment {
    fn owner_id(&self) -> u64 {
        self.owner
    }
}

pub trait Permission {
    fn has_permission(&self, method: MethodClass, principal: &Principal) -> bool;

    fn has_object_permission(&self, _method: MethodClass, _principal: &Principal, _owner_id: u64) -> bool {
        true
    }
}

/// Anyone may read; authenticated users may create; only the owner or a
/// superuser may change or delete.
pub struct IsOwnerOrAdminOrReadOnly;

impl Permission for IsOwnerOrAdminOrReadOnly {
    fn has_permission(&self, method: MethodClass, principal: &Principal) -> bool {
        match method {
            MethodClass::ReadOnly => true,
            MethodClass::Mutating => principal.is_authenticated(),
        }
    }

    fn has_object_permission(&self, method: MethodClass, principal: &Principal, owner_id: u64) -> bool {
        match method {
            MethodClass::ReadOnly => true,
            MethodClass::Mutating => principal.is_superuser() || principal.id() == Some(owner_id),
        }
    }
}

/// Every method requires an authenticated principal.
pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, _method: MethodClass, principal: &Principal) -> bool {
        principal.is_authenticated()
    }
}

/// Runs the collection gate and, when `target` is given, the object gate.
///
/// Anonymous denials become `Unauthorized`, authenticated ones `Forbidden`.
pub fn check<P: Permission, O: Owned>(
    policy: &P,
    method: &Method,
    principal: &Principal,
    target: Option<&O>,
) -> Result<(), ApiError> {
    check_collection(policy, method, principal)?;
    match target {
        Some(target) => check_object(policy, method, principal, target),
        None => Ok(()),
    }
}

/// Collection-level gate, for routes before (or without) a target entity.
pub fn check_collection<P: Permission>(policy: &P, method: &Method, principal: &Principal) -> Result<(), ApiError> {
    let class = MethodClass::of(method);
    if !policy.has_permission(class, principal) {
        warn!(?class, authenticated = principal.is_authenticated(), "request denied");
        return Err(denial(principal));
    }
    Ok(())
}

/// Object-level gate. Callers run [`check_collection`] first.
pub fn check_object<P: Permission, O: Owned>(
    policy: &P,
    method: &Method,
    principal: &Principal,
    target: &O,
) -> Result<(), ApiError> {
    let class = MethodClass::of(method);
    if !policy.has_object_permission(class, principal, target.owner_id()) {
        warn!(?class, principal = ?principal.id(), owner = target.owner_id(), "object access denied");
        return Err(denial(principal));
    }
    Ok(())
}

fn denial(principal: &Principal) -> ApiError {
    if principal.is_authenticated() {
        ApiError::Forbidden
    } else {
        ApiError::Unauthorized
    }
}
