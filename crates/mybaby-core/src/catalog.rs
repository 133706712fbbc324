//! Policy catalog: the set of controllable platforms

use mybaby_api::Platform;
use mybaby_util::PlatformId;

use crate::{EntityKind, PolicyError, PolicyResult};

/// Ordered set of platforms, unique by id
#[derive(Debug, Clone, Default)]
pub struct PolicyCatalog {
    platforms: Vec<Platform>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, validating each entry
    pub fn from_platforms(platforms: impl IntoIterator<Item = Platform>) -> PolicyResult<Self> {
        let mut catalog = Self::new();
        for platform in platforms {
            catalog.add(platform)?;
        }
        Ok(catalog)
    }

    pub fn get(&self, id: &PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PlatformId) -> bool {
        self.get(id).is_some()
    }

    pub fn list(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter().filter(|p| p.enabled)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn add(&mut self, platform: Platform) -> PolicyResult<&Platform> {
        validate_platform(&platform)?;
        if self.contains(&platform.id) {
            return Err(PolicyError::DuplicateId {
                kind: EntityKind::Platform,
                id: platform.id.to_string(),
            });
        }

        self.platforms.push(platform);
        Ok(&self.platforms[self.platforms.len() - 1])
    }

    /// Replace an existing platform, keeping its position
    pub fn update(&mut self, platform: Platform) -> PolicyResult<&Platform> {
        let index = self.index_of(&platform.id)?;
        validate_platform(&platform)?;

        self.platforms[index] = platform;
        Ok(&self.platforms[index])
    }

    /// Flip `enabled`
    pub fn toggle(&mut self, id: &PlatformId) -> PolicyResult<&Platform> {
        let index = self.index_of(id)?;
        let platform = &mut self.platforms[index];
        platform.enabled = !platform.enabled;
        Ok(&self.platforms[index])
    }

    /// Remove a platform. Detaching it from devices is the caller's job
    /// (see [`crate::PolicyState::remove_platform`]).
    pub fn remove(&mut self, id: &PlatformId) -> PolicyResult<Platform> {
        let index = self.index_of(id)?;
        Ok(self.platforms.remove(index))
    }

    fn index_of(&self, id: &PlatformId) -> PolicyResult<usize> {
        self.platforms
            .iter()
            .position(|p| &p.id == id)
            .ok_or_else(|| PolicyError::not_found(EntityKind::Platform, id))
    }
}

/// A platform needs a name and at least one domain pattern, and no pattern
/// may be blank.
fn validate_platform(platform: &Platform) -> PolicyResult<()> {
    if platform.name.trim().is_empty() {
        return Err(PolicyError::EmptyName);
    }
    if platform.domains.is_empty() || platform.domains.iter().any(|d| d.trim().is_empty()) {
        return Err(PolicyError::EmptyDomainList {
            platform_id: platform.id.to_string(),
        });
    }
    Ok(())
}
