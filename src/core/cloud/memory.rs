//! In-memory cloud.
//!
//! Implements every service trait against a shared in-process state. Any
//! region can be marked unavailable, after which every call in it fails.
//!
//! Wrapped data keys are self-describing (key ARN, context and key material),
//! so a value encrypted by one process can be decrypted by another without
//! shared state. For binary tests the rest of the state can be persisted to a
//! JSON file with [`MemoryCloud::open`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use zeroize::Zeroizing;

use super::{
    AliasEntry, CallerIdentity, Cloud, DataKey, EncryptionContext, IdentityService, KeyMetadata,
    KeyService, StackRequest, StackService,
};
use crate::core::arn::Arn;
use crate::core::constants::{KEY_ARN_OUTPUT, SECRET_NAME_CONTEXT_KEY};
use crate::core::context::Context;
use crate::core::domain::{GrantEntry, GrantHandle, GrantRequest};
use crate::error::{CloudError, KeyManagerError, Result};

pub const TEST_ACCOUNT: &str = "123456789012";
pub const TEST_CALLER: &str = "arn:aws:iam::123456789012:user/tester";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FakeKey {
    arn: String,
    enabled: bool,
    policy: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegionState {
    keys: BTreeMap<String, FakeKey>,
    /// alias name -> key ARN
    aliases: BTreeMap<String, String>,
    /// key ARN -> grants
    grants: BTreeMap<String, Vec<GrantEntry>>,
    /// stack name -> (outputs, key ARN it owns)
    stacks: BTreeMap<String, (BTreeMap<String, String>, String)>,
}

#[derive(Debug, Serialize, Deserialize)]
struct State {
    account: String,
    caller_arn: String,
    next_id: u64,
    omit_stack_outputs: bool,
    regions: BTreeMap<String, RegionState>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            account: TEST_ACCOUNT.to_string(),
            caller_arn: TEST_CALLER.to_string(),
            next_id: 1,
            omit_stack_outputs: false,
            regions: BTreeMap::new(),
        }
    }
}

impl State {
    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn region(&mut self, region: &str) -> &mut RegionState {
        self.regions.entry(region.to_string()).or_default()
    }
}

/// Wire format of a wrapped data key.
#[derive(Serialize, Deserialize)]
struct Wrapped {
    key: String,
    context: EncryptionContext,
    material: String,
}

struct Inner {
    state: Mutex<State>,
    unavailable: Mutex<BTreeSet<String>>,
    path: Option<PathBuf>,
}

/// Shared handle to the fake; clones see the same state.
#[derive(Clone)]
pub struct MemoryCloud {
    inner: Arc<Inner>,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                unavailable: Mutex::new(BTreeSet::new()),
                path: None,
            }),
        }
    }

    /// Fake backed by a JSON file, created on first write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            State::default()
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                unavailable: Mutex::new(BTreeSet::new()),
                path: Some(path),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, state: &State) -> Result<()> {
        if let Some(path) = &self.inner.path {
            std::fs::write(path, serde_json::to_vec_pretty(state)?)?;
        }
        Ok(())
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut State) -> Result<T>) -> Result<T> {
        let mut state = self.state();
        let out = f(&mut state)?;
        self.save(&state)?;
        Ok(out)
    }

    fn check_available(&self, region: &str, operation: &'static str) -> Result<()> {
        let unavailable = self
            .inner
            .unavailable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if unavailable.contains(region) {
            return Err(CloudError::service(operation, format!("{region} is unavailable")).into());
        }
        Ok(())
    }

    /// Make every call in `region` fail.
    pub fn fail_region(&self, region: &str) {
        self.inner
            .unavailable
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(region.to_string());
    }

    /// Create a key and return its ARN.
    pub fn add_key(&self, region: &str, policy: &str) -> String {
        let mut state = self.state();
        let arn = new_key(&mut state, region, policy);
        let _ = self.save(&state);
        arn
    }

    pub fn add_alias(&self, region: &str, alias: &str, key_arn: &str) {
        let mut state = self.state();
        state
            .region(region)
            .aliases
            .insert(alias.to_string(), key_arn.to_string());
        let _ = self.save(&state);
    }

    pub fn disable_key(&self, region: &str, key_arn: &str) {
        let mut state = self.state();
        if let Some(key) = state.region(region).keys.get_mut(key_arn) {
            key.enabled = false;
        }
        let _ = self.save(&state);
    }

    /// Register a stack without creating a key behind it.
    pub fn add_stack(&self, region: &str, name: &str) {
        let mut state = self.state();
        state
            .region(region)
            .stacks
            .insert(name.to_string(), (BTreeMap::new(), String::new()));
        let _ = self.save(&state);
    }

    /// Make newly created stacks report no outputs.
    pub fn omit_stack_outputs(&self) {
        self.state().omit_stack_outputs = true;
    }

    pub fn alias_target(&self, region: &str, alias: &str) -> Option<String> {
        self.state()
            .regions
            .get(region)
            .and_then(|r| r.aliases.get(alias).cloned())
    }

    pub fn has_stack(&self, region: &str, name: &str) -> bool {
        self.state()
            .regions
            .get(region)
            .is_some_and(|r| r.stacks.contains_key(name))
    }

    pub fn policy(&self, region: &str, key_arn: &str) -> Option<String> {
        self.state()
            .regions
            .get(region)
            .and_then(|r| r.keys.get(key_arn).map(|k| k.policy.clone()))
    }

    pub fn grants(&self, region: &str, key_arn: &str) -> Vec<GrantEntry> {
        self.state()
            .regions
            .get(region)
            .and_then(|r| r.grants.get(key_arn).cloned())
            .unwrap_or_default()
    }
}

fn new_key(state: &mut State, region: &str, policy: &str) -> String {
    let id = state.next();
    let arn = format!(
        "arn:aws:kms:{}:{}:key/{:08x}-0000-4000-8000-{:012x}",
        region, state.account, id, id
    );
    state.region(region).keys.insert(
        arn.clone(),
        FakeKey {
            arn: arn.clone(),
            enabled: true,
            policy: policy.to_string(),
        },
    );
    arn
}

fn not_found(operation: &'static str, what: &str) -> crate::error::Error {
    CloudError::service(operation, format!("NotFoundException: {what}")).into()
}

fn default_policy(account: &str, parameters: &BTreeMap<String, String>) -> String {
    let split = |name: &str| -> Vec<String> {
        parameters
            .get(name)
            .map(|v| {
                v.split(',')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };
    let doc = json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "AllowIAMPolicies",
                "Effect": "Allow",
                "Principal": {"AWS": format!("arn:aws:iam::{account}:root")},
                "Action": "kms:*",
                "Resource": "*"
            },
            {
                "Sid": "AllowAdministration",
                "Effect": "Allow",
                "Principal": {"AWS": split("AdministratorPrincipals")},
                "Action": ["kms:Create*", "kms:Describe*", "kms:Put*", "kms:ScheduleKeyDeletion"],
                "Resource": "*"
            },
            {
                "Sid": "AllowUse",
                "Effect": "Allow",
                "Principal": {"AWS": split("UserPrincipals")},
                "Action": ["kms:Encrypt", "kms:Decrypt", "kms:GenerateDataKey*"],
                "Resource": "*"
            }
        ]
    });
    doc.to_string()
}

/// One region of the fake.
pub struct MemoryRegion {
    cloud: MemoryCloud,
    region: String,
}

impl MemoryRegion {
    /// Resolve an alias name, alias ARN, key ARN or bare key id to a key ARN.
    fn resolve(&self, state: &State, key_id: &str, operation: &'static str) -> Result<String> {
        let region = state.regions.get(&self.region);
        let alias = match key_id.parse::<Arn>() {
            Ok(arn) if arn.is_kms_alias() => Some(arn.resource),
            Ok(arn) if arn.is_kms_key() => return Ok(key_id.to_string()),
            Ok(_) => return Err(not_found(operation, key_id)),
            Err(_) if key_id.starts_with("alias/") => Some(key_id.to_string()),
            Err(_) => None,
        };
        match alias {
            Some(alias) => region
                .and_then(|r| r.aliases.get(&alias).cloned())
                .ok_or_else(|| not_found(operation, &alias)),
            None => Ok(format!(
                "arn:aws:kms:{}:{}:key/{}",
                self.region, state.account, key_id
            )),
        }
    }

    fn key<'a>(&self, state: &'a State, arn: &str) -> Option<&'a FakeKey> {
        state.regions.get(&self.region).and_then(|r| r.keys.get(arn))
    }
}

#[async_trait]
impl KeyService for MemoryRegion {
    fn region(&self) -> &str {
        &self.region
    }

    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey> {
        self.cloud.check_available(&self.region, "GenerateDataKey")?;
        let state = self.cloud.state();
        let arn = self.resolve(&state, key_id, "GenerateDataKey")?;
        if self.key(&state, &arn).is_some_and(|k| !k.enabled) {
            return Err(CloudError::service("GenerateDataKey", "DisabledException").into());
        }

        let mut material = Zeroizing::new(vec![0u8; 32]);
        rand::thread_rng().fill_bytes(&mut material);
        let wrapped = Wrapped {
            key: arn.clone(),
            context: context.clone(),
            material: hex::encode(material.as_slice()),
        };
        Ok(DataKey {
            plaintext: material,
            ciphertext: serde_json::to_vec(&wrapped)?,
            key_id: arn,
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        ciphertext: &[u8],
        context: &EncryptionContext,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.cloud.check_available(&self.region, "Decrypt")?;
        let state = self.cloud.state();
        let arn = self.resolve(&state, key_id, "Decrypt")?;
        let denied = |reason: &str| KeyManagerError::DecryptionDenied {
            key_id: key_id.to_string(),
            reason: reason.to_string(),
        };

        let wrapped: Wrapped =
            serde_json::from_slice(ciphertext).map_err(|_| denied("malformed ciphertext"))?;
        if wrapped.key != arn {
            return Err(denied("IncorrectKeyException").into());
        }
        if self.key(&state, &arn).is_some_and(|k| !k.enabled) {
            return Err(denied("DisabledException").into());
        }
        if &wrapped.context != context {
            return Err(KeyManagerError::ContextMismatch {
                key_id: key_id.to_string(),
                secret_name: context
                    .get(SECRET_NAME_CONTEXT_KEY)
                    .cloned()
                    .unwrap_or_default(),
            }
            .into());
        }
        let material = hex::decode(&wrapped.material).map_err(|_| denied("malformed key"))?;
        Ok(Zeroizing::new(material))
    }

    async fn list_aliases(&self, key_id: Option<&str>) -> Result<Vec<AliasEntry>> {
        self.cloud.check_available(&self.region, "ListAliases")?;
        let state = self.cloud.state();
        let Some(region) = state.regions.get(&self.region) else {
            return Ok(Vec::new());
        };
        Ok(region
            .aliases
            .iter()
            .filter(|(_, target)| key_id.map_or(true, |k| target.ends_with(k)))
            .map(|(name, target)| AliasEntry {
                name: name.clone(),
                arn: format!("arn:aws:kms:{}:{}:{}", self.region, state.account, name),
                target_key_id: target.parse::<Arn>().ok().and_then(|a| {
                    a.kms_key_id().map(str::to_string)
                }),
            })
            .collect())
    }

    async fn create_alias(&self, alias: &str, key_id: &str) -> Result<()> {
        self.cloud.check_available(&self.region, "CreateAlias")?;
        self.cloud.mutate(|state| {
            let arn = self.resolve(state, key_id, "CreateAlias")?;
            let region = state.region(&self.region);
            if region.aliases.contains_key(alias) {
                return Err(CloudError::service("CreateAlias", "AlreadyExistsException").into());
            }
            region.aliases.insert(alias.to_string(), arn);
            Ok(())
        })
    }

    async fn delete_alias(&self, alias: &str) -> Result<()> {
        self.cloud.check_available(&self.region, "DeleteAlias")?;
        self.cloud.mutate(|state| {
            state
                .region(&self.region)
                .aliases
                .remove(alias)
                .map(|_| ())
                .ok_or_else(|| not_found("DeleteAlias", alias))
        })
    }

    async fn describe_key(&self, key_id: &str) -> Result<KeyMetadata> {
        self.cloud.check_available(&self.region, "DescribeKey")?;
        let state = self.cloud.state();
        let arn = self.resolve(&state, key_id, "DescribeKey")?;
        let key = self
            .key(&state, &arn)
            .ok_or_else(|| not_found("DescribeKey", &arn))?;
        Ok(KeyMetadata {
            key_id: arn
                .parse::<Arn>()?
                .kms_key_id()
                .unwrap_or_default()
                .to_string(),
            arn: key.arn.clone(),
            enabled: key.enabled,
        })
    }

    async fn get_key_policy(&self, key_id: &str) -> Result<String> {
        self.cloud.check_available(&self.region, "GetKeyPolicy")?;
        let state = self.cloud.state();
        let arn = self.resolve(&state, key_id, "GetKeyPolicy")?;
        self.key(&state, &arn)
            .map(|k| k.policy.clone())
            .ok_or_else(|| not_found("GetKeyPolicy", &arn))
    }

    async fn put_key_policy(&self, key_id: &str, policy: &str) -> Result<()> {
        self.cloud.check_available(&self.region, "PutKeyPolicy")?;
        self.cloud.mutate(|state| {
            let arn = self.resolve(state, key_id, "PutKeyPolicy")?;
            let key = state
                .region(&self.region)
                .keys
                .get_mut(&arn)
                .ok_or_else(|| not_found("PutKeyPolicy", &arn))?;
            key.policy = policy.to_string();
            Ok(())
        })
    }

    async fn create_grant(&self, key_id: &str, request: &GrantRequest) -> Result<GrantHandle> {
        self.cloud.check_available(&self.region, "CreateGrant")?;
        self.cloud.mutate(|state| {
            let arn = self.resolve(state, key_id, "CreateGrant")?;
            let id = state.next();
            let handle = GrantHandle {
                grant_id: format!("grant-{id:06}"),
                grant_token: format!("token-{id:06}"),
            };
            state
                .region(&self.region)
                .grants
                .entry(arn)
                .or_default()
                .push(GrantEntry {
                    name: request.name.clone(),
                    grant_id: handle.grant_id.clone(),
                    operations: request.operations.clone(),
                    grantee_principal: request.grantee_principal.clone(),
                    retiring_principal: request.retiring_principal.clone(),
                    constraints: request.constraints.clone(),
                });
            Ok(handle)
        })
    }

    async fn list_grants(&self, key_id: &str) -> Result<Vec<GrantEntry>> {
        self.cloud.check_available(&self.region, "ListGrants")?;
        let state = self.cloud.state();
        let arn = self.resolve(&state, key_id, "ListGrants")?;
        Ok(state
            .regions
            .get(&self.region)
            .and_then(|r| r.grants.get(&arn).cloned())
            .unwrap_or_default())
    }

    async fn retire_grant(&self, key_id: &str, grant_id: &str) -> Result<()> {
        self.cloud.check_available(&self.region, "RetireGrant")?;
        self.cloud.mutate(|state| {
            let arn = self.resolve(state, key_id, "RetireGrant")?;
            let grants = state.region(&self.region).grants.entry(arn).or_default();
            let before = grants.len();
            grants.retain(|g| g.grant_id != grant_id);
            if grants.len() == before {
                return Err(not_found("RetireGrant", grant_id));
            }
            Ok(())
        })
    }
}

#[async_trait]
impl StackService for MemoryRegion {
    async fn stack_exists(&self, name: &str) -> Result<bool> {
        self.cloud.check_available(&self.region, "DescribeStacks")?;
        Ok(self.cloud.has_stack(&self.region, name))
    }

    async fn create_stack(
        &self,
        _ctx: &Context,
        request: &StackRequest,
    ) -> Result<BTreeMap<String, String>> {
        self.cloud.check_available(&self.region, "CreateStack")?;
        self.cloud.mutate(|state| {
            if state.region(&self.region).stacks.contains_key(&request.name) {
                return Err(CloudError::service("CreateStack", "AlreadyExistsException").into());
            }
            let policy = default_policy(&state.account, &request.parameters);
            let arn = new_key(state, &self.region, &policy);
            let mut outputs = BTreeMap::new();
            if !state.omit_stack_outputs {
                outputs.insert(KEY_ARN_OUTPUT.to_string(), arn.clone());
            }
            state
                .region(&self.region)
                .stacks
                .insert(request.name.clone(), (outputs.clone(), arn));
            Ok(outputs)
        })
    }

    async fn delete_stack(&self, _ctx: &Context, name: &str, _timeout: Duration) -> Result<()> {
        self.cloud.check_available(&self.region, "DeleteStack")?;
        self.cloud.mutate(|state| {
            let region = state.region(&self.region);
            if let Some((_, key_arn)) = region.stacks.remove(name) {
                region.keys.remove(&key_arn);
            }
            Ok(())
        })
    }
}

#[async_trait]
impl IdentityService for MemoryCloud {
    async fn caller_identity(&self) -> Result<CallerIdentity> {
        let state = self.state();
        Ok(CallerIdentity {
            account: state.account.clone(),
            arn: state.caller_arn.clone(),
        })
    }
}

impl Cloud for MemoryCloud {
    fn kms(&self, region: &str) -> Arc<dyn KeyService> {
        Arc::new(MemoryRegion {
            cloud: self.clone(),
            region: region.to_string(),
        })
    }

    fn stacks(&self, region: &str) -> Arc<dyn StackService> {
        Arc::new(MemoryRegion {
            cloud: self.clone(),
            region: region.to_string(),
        })
    }

    fn identity(&self) -> Arc<dyn IdentityService> {
        Arc::new(self.clone())
    }
}
