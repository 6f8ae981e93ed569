//! Conditions and change notifications.
//!
//! A condition is a named entity that domains observe. When a condition
//! changes (or membership around it changes), every member that joined an
//! observing domain with `track_condition = true` is notified synchronously.

use crate::error::ConfigError;
use crate::ids::{ActorId, ConditionId, DomainId};
use crate::sim::World;
use std::collections::BTreeSet;
use tracing::debug;

/// Why a condition notification fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionMode {
    /// The observer joined a domain that observes the condition.
    ObserverJoinedDomain,
    /// The observer left (or was removed from) a domain that observes the
    /// condition.
    ObserverLeftDomain,
    /// The condition was attached to a domain the observer is in.
    DomainAddedCondition,
    /// The condition was detached from a domain the observer is in.
    DomainRemovedCondition,
    /// The condition itself signalled a change.
    ObserverNotified,
    /// The condition was deleted.
    ConditionDeleted,
}

/// One condition change as seen by an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionChange {
    /// The condition that changed.
    pub condition: ConditionId,
    /// Why the notification fired.
    pub mode: ConditionMode,
    /// The domain through which the observer sees the condition.
    pub domain: Option<DomainId>,
}

pub(crate) struct ConditionState {
    pub(crate) name: String,
    /// Domains currently observing this condition.
    pub(crate) domains: BTreeSet<DomainId>,
}

impl World {
    /// Create a condition.
    pub fn create_condition(&mut self, name: &str) -> Result<ConditionId, ConfigError> {
        if self.condition_names.contains_key(name) {
            return Err(ConfigError::NameInUse(name.to_string()));
        }
        let id = ConditionId::from_index(self.conditions.insert(ConditionState {
            name: name.to_string(),
            domains: BTreeSet::new(),
        }));
        self.condition_names.insert(name.to_string(), id);
        debug!(condition = %name, %id, "created condition");
        Ok(id)
    }

    /// Look up a condition by name.
    pub fn find_condition(&self, name: &str) -> Option<ConditionId> {
        self.condition_names.get(name).copied()
    }

    /// A condition's name.
    pub fn condition_name(&self, id: ConditionId) -> Result<&str, ConfigError> {
        self.conditions
            .get(id.index())
            .map(|c| c.name.as_str())
            .ok_or(ConfigError::UnknownCondition(id))
    }

    /// The domains currently observing a condition.
    pub fn condition_domains(&self, id: ConditionId) -> Result<Vec<DomainId>, ConfigError> {
        self.conditions
            .get(id.index())
            .map(|c| c.domains.iter().copied().collect())
            .ok_or(ConfigError::UnknownCondition(id))
    }

    /// Attach a condition to a domain.
    ///
    /// Returns `Ok(false)` if the domain already observes the condition.
    /// Tracking members of the domain are notified with
    /// [`ConditionMode::DomainAddedCondition`].
    pub fn domain_add_condition(
        &mut self,
        domain: DomainId,
        condition: ConditionId,
    ) -> Result<bool, ConfigError> {
        if !self.conditions.contains(condition.index()) {
            return Err(ConfigError::UnknownCondition(condition));
        }
        let added = {
            let d = self
                .domains
                .get_mut(domain.index())
                .ok_or(ConfigError::UnknownDomain(domain))?;
            d.conditions.insert(condition)
        };
        if added {
            if let Some(c) = self.conditions.get_mut(condition.index()) {
                c.domains.insert(domain);
            }
            self.fan_condition_change(
                domain,
                ConditionChange {
                    condition,
                    mode: ConditionMode::DomainAddedCondition,
                    domain: Some(domain),
                },
            );
        }
        Ok(added)
    }

    /// Detach a condition from a domain.
    ///
    /// Returns `Ok(false)` if the domain was not observing the condition.
    /// Tracking members are notified with
    /// [`ConditionMode::DomainRemovedCondition`].
    pub fn domain_remove_condition(
        &mut self,
        domain: DomainId,
        condition: ConditionId,
    ) -> Result<bool, ConfigError> {
        if !self.conditions.contains(condition.index()) {
            return Err(ConfigError::UnknownCondition(condition));
        }
        let removed = {
            let d = self
                .domains
                .get_mut(domain.index())
                .ok_or(ConfigError::UnknownDomain(domain))?;
            d.conditions.remove(&condition)
        };
        if removed {
            if let Some(c) = self.conditions.get_mut(condition.index()) {
                c.domains.remove(&domain);
            }
            self.fan_condition_change(
                domain,
                ConditionChange {
                    condition,
                    mode: ConditionMode::DomainRemovedCondition,
                    domain: Some(domain),
                },
            );
        }
        Ok(removed)
    }

    /// Signal a change on a condition.
    ///
    /// Tracking members of every observing domain receive
    /// [`ConditionMode::ObserverNotified`].
    pub fn notify_condition(&mut self, condition: ConditionId) -> Result<(), ConfigError> {
        let domains: Vec<DomainId> = self
            .conditions
            .get(condition.index())
            .ok_or(ConfigError::UnknownCondition(condition))?
            .domains
            .iter()
            .copied()
            .collect();
        for d in domains {
            self.fan_condition_change(
                d,
                ConditionChange {
                    condition,
                    mode: ConditionMode::ObserverNotified,
                    domain: Some(d),
                },
            );
        }
        Ok(())
    }

    /// Delete a condition.
    ///
    /// Observers are notified with [`ConditionMode::ConditionDeleted`], then
    /// the condition is detached from every domain and removed.
    pub fn delete_condition(&mut self, condition: ConditionId) -> Result<(), ConfigError> {
        let domains: Vec<DomainId> = self
            .conditions
            .get(condition.index())
            .ok_or(ConfigError::UnknownCondition(condition))?
            .domains
            .iter()
            .copied()
            .collect();
        for d in &domains {
            self.fan_condition_change(
                *d,
                ConditionChange {
                    condition,
                    mode: ConditionMode::ConditionDeleted,
                    domain: Some(*d),
                },
            );
        }
        for d in domains {
            if let Some(dom) = self.domains.get_mut(d.index()) {
                dom.conditions.remove(&condition);
            }
        }
        if let Some(state) = self.conditions.remove(condition.index()) {
            self.condition_names.remove(&state.name);
            debug!(condition = %state.name, "deleted condition");
        }
        Ok(())
    }

    /// Deliver one change to every actor tracking conditions through
    /// `domain`'s memberships.
    pub(crate) fn fan_condition_change(&mut self, domain: DomainId, change: ConditionChange) {
        let actors = self.tracking_actors_of(domain);
        let changes = vec![change];
        for a in actors {
            crate::actor::notify_actor(self, a, changes.clone());
        }
    }

    /// The actors behind every tracking membership of a domain, in id order.
    pub(crate) fn tracking_actors_of(&self, domain: DomainId) -> Vec<ActorId> {
        let Some(d) = self.domains.get(domain.index()) else {
            return Vec::new();
        };
        let mut actors = BTreeSet::new();
        for m in &d.tracking_members {
            if let Some(member) = self.memberships.get(m.index()) {
                actors.extend(member.actors.iter().copied());
            }
        }
        actors.into_iter().collect()
    }
}
