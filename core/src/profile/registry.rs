//! Profile registry

use std::any::TypeId;
use std::sync::Arc;

use hashbrown::HashMap;

use super::Profile;
use crate::reflection::MemberKey;

/// Every installed profile, indexed by member and by declaring type
#[derive(Debug, Default)]
pub struct ProfileRegistry {
    by_key: HashMap<MemberKey, Arc<Profile>>,
    /// Instance profiles per declaring type, in discovery order
    by_type: HashMap<TypeId, Vec<Arc<Profile>>>,
    statics: Vec<Arc<Profile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a profile
    ///
    /// Returns `None` when a profile for the same member is already installed;
    /// the existing one is kept.
    pub fn insert(&mut self, profile: Profile) -> Option<Arc<Profile>> {
        if self.by_key.contains_key(profile.key()) {
            tracing::debug!("Profile {} already installed", profile.descriptor().ident);
            return None;
        }

        let profile = Arc::new(profile);
        self.by_key.insert(profile.key().clone(), profile.clone());
        if profile.is_static() {
            self.statics.push(profile.clone());
        } else {
            self.by_type
                .entry(profile.key().type_id)
                .or_default()
                .push(profile.clone());
        }
        Some(profile)
    }

    pub fn get(&self, key: &MemberKey) -> Option<&Arc<Profile>> {
        self.by_key.get(key)
    }

    /// Instance profiles declared on a type
    pub fn instance_profiles(&self, type_id: TypeId) -> &[Arc<Profile>] {
        self.by_type.get(&type_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_profiles(&self) -> &[Arc<Profile>] {
        &self.statics
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Profile>> {
        self.by_key.values()
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_type.clear();
        self.statics.clear();
    }
}
