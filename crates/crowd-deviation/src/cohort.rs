use agent_core::Agent;

/// Below this many same-category agents the cohort widens to every agent.
pub const MIN_COHORT_SIZE: usize = 3;

/// Peers `agent` is compared against, including `agent` itself when it is
/// part of `agents`.
pub fn cohort_for_agent<'a>(agents: &'a [Agent], agent: &Agent) -> Vec<&'a Agent> {
    let same: Vec<&Agent> = agents
        .iter()
        .filter(|a| a.category == agent.category)
        .collect();
    if same.len() < MIN_COHORT_SIZE {
        agents.iter().collect()
    } else {
        same
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn agent(category: &str) -> Agent {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let mut a = Agent::new("Peer", "", now, dec!(1000));
        a.category = category.to_string();
        a
    }

    #[test]
    fn same_category_when_large_enough() {
        let agents = vec![
            agent("momentum"),
            agent("momentum"),
            agent("momentum"),
            agent("income"),
        ];
        let cohort = cohort_for_agent(&agents, &agents[0]);
        assert_eq!(cohort.len(), 3);
        assert!(cohort.iter().all(|a| a.category == "momentum"));
    }

    #[test]
    fn falls_back_to_everyone() {
        let agents = vec![agent("momentum"), agent("momentum"), agent("income")];
        let cohort = cohort_for_agent(&agents, &agents[2]);
        assert_eq!(cohort.len(), 3);
    }
}
