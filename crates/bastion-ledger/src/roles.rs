// crates/bastion-ledger/src/roles.rs
//
// Role holders of a module and the capability passed into each operation.
//
// A `Caller` can only be built from a module's own `Roles`, so its flags
// always reflect that module's assignments. Operations check the flags
// they need; loss entitlements are engine state and checked separately.

use serde::{Deserialize, Serialize};

use bastion_core::{AccountId, BastionError, ModuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    /// Governs configuration; may pause and unpause.
    pub owner: AccountId,
    /// May pause and unpause.
    pub guardian: AccountId,
    /// The registry that deployed the module; batches pause/unpause and claims fees.
    pub manager: AccountId,
}

impl Roles {
    pub(crate) fn caller(&self, module: ModuleId, account: AccountId) -> Caller {
        Caller {
            module,
            account,
            is_owner: account == self.owner,
            is_guardian: account == self.guardian,
            is_manager: account == self.manager,
        }
    }
}

/// Capability context for one call into a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    module: ModuleId,
    account: AccountId,
    is_owner: bool,
    is_guardian: bool,
    is_manager: bool,
}

impl Caller {
    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn is_guardian(&self) -> bool {
        self.is_guardian
    }

    pub fn is_manager(&self) -> bool {
        self.is_manager
    }

    pub(crate) fn require_owner(&self) -> Result<(), BastionError> {
        if self.is_owner {
            Ok(())
        } else {
            Err(BastionError::Unauthorized(format!(
                "{} is not the module owner",
                self.account
            )))
        }
    }

    pub(crate) fn require_manager(&self) -> Result<(), BastionError> {
        if self.is_manager {
            Ok(())
        } else {
            Err(BastionError::Unauthorized(format!(
                "{} is not the module manager",
                self.account
            )))
        }
    }

    pub(crate) fn require_pauser(&self) -> Result<(), BastionError> {
        if self.is_owner || self.is_guardian || self.is_manager {
            Ok(())
        } else {
            Err(BastionError::Unauthorized(format!(
                "{} may not pause or unpause",
                self.account
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles() -> Roles {
        Roles {
            owner: AccountId::repeat(1),
            guardian: AccountId::repeat(2),
            manager: AccountId::repeat(3),
        }
    }

    #[test]
    fn test_caller_flags() {
        let module = ModuleId::repeat(9);
        let owner = roles().caller(module, AccountId::repeat(1));
        assert!(owner.is_owner() && !owner.is_guardian() && !owner.is_manager());
        assert!(owner.require_owner().is_ok());
        assert!(owner.require_pauser().is_ok());
        assert!(owner.require_manager().is_err());

        let guardian = roles().caller(module, AccountId::repeat(2));
        assert!(guardian.require_owner().is_err());
        assert!(guardian.require_pauser().is_ok());

        let stranger = roles().caller(module, AccountId::repeat(4));
        assert!(matches!(
            stranger.require_pauser(),
            Err(BastionError::Unauthorized(_))
        ));
    }
}
