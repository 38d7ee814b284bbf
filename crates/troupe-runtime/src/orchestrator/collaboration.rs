// Troupe Runtime - Collaboration engine
//
// Composes a group of agents under one of six patterns. Vote grouping for
// consensus hashes the canonical JSON of each result.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info, warn};

use troupe_core::{
    AgentData, CollaborationGroup, CollaborationPattern, FunctionResult, TroupeError,
    TroupeResult, Value,
};

use crate::manager::AgentManager;

/// Executes collaboration groups
pub struct CollaborationEngine {
    manager: Arc<AgentManager>,
    groups: Mutex<HashMap<String, CollaborationGroup>>,
}

impl CollaborationEngine {
    pub fn new(manager: Arc<AgentManager>) -> Self {
        Self {
            manager,
            groups: Mutex::new(HashMap::new()),
        }
    }

    pub fn create_group(&self, group: CollaborationGroup) -> TroupeResult<()> {
        let mut groups = self.groups.lock();
        if groups.contains_key(&group.group_id) {
            return Err(TroupeError::conflict(format!(
                "collaboration group '{}' already exists",
                group.group_id
            )));
        }
        info!(group = %group.group_id, pattern = ?group.pattern, "created collaboration group");
        groups.insert(group.group_id.clone(), group);
        Ok(())
    }

    pub fn remove_group(&self, group_id: &str) -> bool {
        self.groups.lock().remove(group_id).is_some()
    }

    pub fn list_groups(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stored result of the group's last run
    pub fn get_result(&self, group_id: &str) -> Option<AgentData> {
        self.groups
            .lock()
            .get(group_id)
            .and_then(|g| g.shared_context.get_map("result").cloned())
    }

    /// Run the group's pattern over the input and store the result in the
    /// group's shared context
    pub async fn execute(&self, group_id: &str, input: AgentData) -> TroupeResult<AgentData> {
        let group = self
            .groups
            .lock()
            .get(group_id)
            .cloned()
            .ok_or_else(|| {
                TroupeError::not_found(format!("collaboration group '{}'", group_id))
            })?;

        let result = match group.pattern {
            CollaborationPattern::Sequential => self.run_sequential(&group, input).await,
            CollaborationPattern::Parallel => self.run_parallel(&group, input).await,
            CollaborationPattern::Pipeline => self.run_pipeline(&group, input).await,
            CollaborationPattern::Consensus => self.run_consensus(&group, input).await,
            CollaborationPattern::Hierarchy => self.run_hierarchy(&group, input).await,
            CollaborationPattern::Negotiation => self.run_negotiation(&group, input).await,
        };

        if let Some(stored) = self.groups.lock().get_mut(group_id) {
            stored.shared_context = AgentData::new().with("result", result.clone());
        }
        Ok(result)
    }

    /// Chain agents; each receives the previous result as input
    async fn run_sequential(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        let mut current = input;
        for agent_id in &group.agent_ids {
            let Some(agent) = self.manager.resolve(agent_id) else {
                warn!(agent = %agent_id, "agent missing from sequential chain");
                continue;
            };
            let result = agent.execute_function("process", current.clone()).await;
            if result.success {
                current = result.data;
            }
        }
        current
    }

    /// Fan out to all agents; aggregate via the group aggregator or the
    /// default `{result_i, success_count}` shape
    async fn run_parallel(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        let results = self.fan_out(group, "process", &input).await;

        if let Some(aggregator) = &group.result_aggregator {
            return aggregator(&results);
        }

        let mut aggregated = AgentData::new();
        let mut success_count: usize = 0;
        for result in &results {
            if result.success {
                aggregated.set(format!("result_{}", success_count), result.data.clone());
                success_count += 1;
            }
        }
        aggregated.set("success_count", success_count);
        aggregated
    }

    /// Sequential with explicit input→output binding
    async fn run_pipeline(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        self.run_sequential(group, input).await
    }

    /// All agents vote; identical canonical results form a bucket, and
    /// consensus requires the largest bucket to reach the threshold
    async fn run_consensus(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        if group.agent_ids.is_empty() {
            return AgentData::new()
                .with("error", "No agents available for consensus collaboration")
                .with("consensus_achieved", false);
        }

        info!(
            group = %group.group_id,
            agents = group.agent_ids.len(),
            threshold = group.consensus_threshold,
            "starting consensus collaboration"
        );

        let results = self.fan_out(group, "analyze_and_vote", &input).await;

        // result hash → (voters, candidate result)
        let mut vote_groups: BTreeMap<String, (Vec<String>, AgentData)> = BTreeMap::new();
        let mut successful: usize = 0;
        for (agent_id, result) in group.agent_ids.iter().zip(results.iter()) {
            if !result.success {
                warn!(agent = %agent_id, error = %result.error, "consensus voter failed");
                continue;
            }
            successful += 1;
            let mut hasher = DefaultHasher::new();
            result.data.to_json().hash(&mut hasher);
            let key = format!("{:016x}", hasher.finish());
            debug!(agent = %agent_id, vote = %key, "vote recorded");
            vote_groups
                .entry(key)
                .or_insert_with(|| (Vec::new(), result.data.clone()))
                .0
                .push(agent_id.clone());
        }

        if successful == 0 {
            return AgentData::new()
                .with("error", "No valid results from any agent")
                .with("consensus_achieved", false)
                .with("participating_agents", group.agent_ids.len())
                .with("successful_agents", 0i64);
        }

        let total_vote_groups = vote_groups.len();
        let (winning_voters, winning_result, max_votes) = vote_groups
            .values()
            .map(|(voters, candidate)| (voters.clone(), candidate.clone(), voters.len()))
            .max_by_key(|(_, _, votes)| *votes)
            .unwrap_or((Vec::new(), AgentData::new(), 0));

        let consensus_achieved = max_votes >= group.consensus_threshold;

        let mut consensus = if consensus_achieved {
            info!(
                votes = max_votes,
                threshold = group.consensus_threshold,
                "consensus achieved"
            );
            winning_result
                .with("consensus_achieved", true)
                .with("consensus_votes", max_votes)
                .with("required_threshold", group.consensus_threshold)
                .with(
                    "winning_voters",
                    Value::List(winning_voters.into_iter().map(Value::String).collect()),
                )
        } else {
            info!(
                highest = max_votes,
                threshold = group.consensus_threshold,
                "no consensus reached"
            );
            let base = match &group.result_aggregator {
                Some(aggregator) => aggregator(&results),
                None => winning_result,
            };
            base.with("consensus_achieved", false)
                .with("highest_agreement", max_votes)
                .with("required_threshold", group.consensus_threshold)
        };

        consensus.set("participating_agents", group.agent_ids.len());
        consensus.set("successful_agents", successful);
        consensus.set("total_vote_groups", total_vote_groups);
        consensus.set("collaboration_pattern", "consensus");
        consensus
    }

    /// The first agent is master and coordinates the rest
    async fn run_hierarchy(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        let Some(master_id) = group.agent_ids.first() else {
            return AgentData::new();
        };
        let Some(master) = self.manager.resolve(master_id) else {
            return AgentData::new().with("error", "Master agent not found");
        };
        master.execute_function("coordinate", input).await.data
    }

    /// Up to max rounds; in each round the first successful response
    /// becomes the next proposal
    async fn run_negotiation(&self, group: &CollaborationGroup, input: AgentData) -> AgentData {
        let mut proposal = input;

        for round in 0..group.max_negotiation_rounds {
            let responses = self.fan_out(group, "negotiate", &proposal).await;
            let Some(next) = responses.into_iter().find(|r| r.success) else {
                debug!(round, "no successful negotiation response, stopping");
                break;
            };
            proposal = next.data;
        }

        proposal
    }

    async fn fan_out(
        &self,
        group: &CollaborationGroup,
        function_name: &str,
        input: &AgentData,
    ) -> Vec<FunctionResult> {
        let calls = group.agent_ids.iter().map(|agent_id| {
            let manager = self.manager.clone();
            let agent_id = agent_id.clone();
            let function_name = function_name.to_string();
            let input = input.clone();
            async move {
                match manager.resolve(&agent_id) {
                    Some(agent) => agent.execute_function(&function_name, input).await,
                    None => FunctionResult::error(format!("Agent not found: {}", agent_id)),
                }
            }
        });
        join_all(calls).await
    }
}
