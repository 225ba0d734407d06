use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::recording::{Recording, RecordedSignal};

/// Offline what-if queries over a finished recording.
///
/// Works entirely from the recorded per-signal durations and declared
/// dependencies; nothing is re-run. Projections assume unbounded
/// concurrency: a signal starts the moment its last prerequisite
/// finishes.
pub struct WhatIf<'a> {
    signals: BTreeMap<&'a str, &'a RecordedSignal>,
    dependents: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> WhatIf<'a> {
    pub fn new(recording: &'a Recording) -> Self {
        let signals: BTreeMap<&str, &RecordedSignal> = recording
            .signals
            .iter()
            .map(|s| (s.signal_name.as_str(), s))
            .collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for signal in &recording.signals {
            for dep in signal.dependencies.iter().flatten() {
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(signal.signal_name.as_str());
            }
        }
        Self { signals, dependents }
    }

    fn duration_of(&self, name: &str, overrides: &HashMap<&str, u64>) -> u64 {
        overrides
            .get(name)
            .copied()
            .or_else(|| self.signals.get(name).map(|s| s.duration_ms))
            .unwrap_or(0)
    }

    /// Earliest-finish time of one signal under the dependency relation.
    fn finish_time(
        &self,
        name: &'a str,
        overrides: &HashMap<&str, u64>,
        memo: &mut HashMap<&'a str, u64>,
        visiting: &mut HashSet<&'a str>,
    ) -> u64 {
        if let Some(&cached) = memo.get(name) {
            return cached;
        }
        // A recorded cycle would be corrupt input; break it rather than
        // recurse forever.
        if !visiting.insert(name) {
            return 0;
        }
        let deps_finish = self
            .signals
            .get(name)
            .into_iter()
            .flat_map(|s| s.dependencies.iter().flatten())
            .map(|dep| {
                let dep: &str = dep.as_str();
                match self.signals.get_key_value(dep) {
                    Some((&key, _)) => self.finish_time(key, overrides, memo, visiting),
                    None => 0,
                }
            })
            .max()
            .unwrap_or(0);
        visiting.remove(name);

        let finish = deps_finish + self.duration_of(name, overrides);
        memo.insert(name, finish);
        finish
    }

    /// Projected total duration with substituted per-signal durations.
    ///
    /// With no overrides this is the idealized critical-path length of
    /// the recorded run.
    pub fn projected_total_ms(&self, overrides: &HashMap<&str, u64>) -> u64 {
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        self.signals
            .keys()
            .map(|&name| self.finish_time(name, overrides, &mut memo, &mut visiting))
            .max()
            .unwrap_or(0)
    }

    /// Projected total duration if one signal had taken `duration_ms`.
    pub fn with_duration(&self, name: &str, duration_ms: u64) -> u64 {
        self.projected_total_ms(&HashMap::from([(name, duration_ms)]))
    }

    /// The longest dependency chain by recorded duration, prerequisites
    /// first.
    pub fn critical_path(&self) -> Vec<String> {
        let overrides = HashMap::new();
        let mut memo = HashMap::new();
        let mut visiting = HashSet::new();
        let end = self
            .signals
            .keys()
            .max_by_key(|&&name| self.finish_time(name, &overrides, &mut memo, &mut visiting));
        let Some(&end) = end else {
            return Vec::new();
        };

        // Walk backwards along the prerequisite with the latest finish.
        let mut path = vec![end.to_string()];
        let mut current = end;
        loop {
            let next = self
                .signals
                .get(current)
                .into_iter()
                .flat_map(|s| s.dependencies.iter().flatten())
                .filter_map(|dep| self.signals.get_key_value(dep.as_str()).map(|(&k, _)| k))
                .max_by_key(|&dep| memo.get(dep).copied().unwrap_or(0));
            match next {
                Some(dep) => {
                    path.push(dep.to_string());
                    current = dep;
                }
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Every signal that would have been cancelled or skipped had `name`
    /// failed: its transitive dependents, breadth-first.
    pub fn blast_radius(&self, name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for &dependent in self.dependents.get(current).into_iter().flatten() {
                if seen.insert(dependent) {
                    out.push(dependent.to_string());
                    queue.push_back(dependent);
                }
            }
        }
        out.sort();
        out
    }
}
