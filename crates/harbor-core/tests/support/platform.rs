use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use harbor_core::platform::{
    AppInfo, Dyno, Formation, FormationUpdate, Platform, PlatformError,
};

/// In-memory platform double. Records every call in order and scripts the
/// lifecycle states one-off dynos report before they disappear.
#[derive(Clone)]
pub struct FakePlatform {
    state: Rc<RefCell<State>>,
}

struct State {
    git_url: String,
    maintenance: bool,
    formation: BTreeMap<String, u32>,
    dynos: Vec<Dyno>,
    poll_script: Vec<String>,
    one_off_states: HashMap<String, VecDeque<String>>,
    finished: HashSet<String>,
    next_dyno: u32,
    events: Vec<String>,
}

impl FakePlatform {
    pub fn new(git_url: &str) -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                git_url: git_url.to_string(),
                maintenance: false,
                formation: BTreeMap::new(),
                dynos: Vec::new(),
                poll_script: Vec::new(),
                one_off_states: HashMap::new(),
                finished: HashSet::new(),
                next_dyno: 0,
                events: Vec::new(),
            })),
        }
    }

    pub fn with_formation(self, counts: &[(&str, u32)]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for (process_type, quantity) in counts {
                state
                    .formation
                    .insert(process_type.to_string(), *quantity);
            }
        }
        self
    }

    pub fn with_web_dynos(self, count: u32) -> Self {
        {
            let mut state = self.state.borrow_mut();
            for i in 1..=count {
                state.dynos.push(Dyno {
                    id: format!("web-{i}"),
                    process_type: "web".to_string(),
                    command: "bundle exec puma".to_string(),
                    state: "up".to_string(),
                });
            }
        }
        self
    }

    pub fn with_worker_dyno(self) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.dynos.push(Dyno {
                id: "worker-1".to_string(),
                process_type: "worker".to_string(),
                command: "bundle exec sidekiq".to_string(),
                state: "up".to_string(),
            });
        }
        self
    }

    /// States each one-off dyno reports on successive polls before the
    /// platform stops finding it.
    pub fn with_poll_states(self, states: &[&str]) -> Self {
        self.state.borrow_mut().poll_script =
            states.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.state.borrow().events.clone()
    }

    pub fn formation_counts(&self) -> BTreeMap<String, u32> {
        self.state.borrow().formation.clone()
    }

    pub fn maintenance(&self) -> bool {
        self.state.borrow().maintenance
    }
}

impl Platform for FakePlatform {
    fn app_info(&self, app_name: &str) -> Result<AppInfo, PlatformError> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("app_info {app_name}"));
        Ok(AppInfo {
            name: app_name.to_string(),
            git_url: state.git_url.clone(),
            maintenance: state.maintenance,
        })
    }

    fn set_maintenance(&self, _app_name: &str, enabled: bool) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        state.maintenance = enabled;
        state.events.push(format!(
            "maintenance {}",
            if enabled { "on" } else { "off" }
        ));
        Ok(())
    }

    fn formation(&self, _app_name: &str) -> Result<Vec<Formation>, PlatformError> {
        let mut state = self.state.borrow_mut();
        state.events.push("formation".to_string());
        Ok(state
            .formation
            .iter()
            .map(|(process_type, &quantity)| Formation {
                process_type: process_type.clone(),
                quantity,
            })
            .collect())
    }

    fn scale(&self, _app_name: &str, updates: &[FormationUpdate]) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        let described: Vec<String> = updates
            .iter()
            .map(|update| format!("{}={}", update.process_type, update.quantity))
            .collect();
        let event = if described.is_empty() {
            "scale".to_string()
        } else {
            format!("scale {}", described.join(","))
        };
        state.events.push(event);
        for update in updates {
            state
                .formation
                .insert(update.process_type.clone(), update.quantity);
        }
        Ok(())
    }

    fn run_one_off(&self, _app_name: &str, command: &str) -> Result<Dyno, PlatformError> {
        let mut state = self.state.borrow_mut();
        state.next_dyno += 1;
        let id = format!("run-{}", state.next_dyno);
        state.events.push(format!("run_one_off {command}"));
        let script: VecDeque<String> = state.poll_script.iter().cloned().collect();
        state.one_off_states.insert(id.clone(), script);
        Ok(Dyno {
            id,
            process_type: "run".to_string(),
            command: command.to_string(),
            state: "starting".to_string(),
        })
    }

    fn dyno_info(&self, _app_name: &str, dyno_id: &str) -> Result<Dyno, PlatformError> {
        let mut state = self.state.borrow_mut();
        if state.finished.contains(dyno_id) {
            // The orchestrator must never poll again once absence was
            // reported; leave a marker for the assertion.
            state.events.push(format!("poll_after_done {dyno_id}"));
            return Err(PlatformError::NotFound {
                resource: format!("dynos/{dyno_id}"),
            });
        }
        let next = state
            .one_off_states
            .get_mut(dyno_id)
            .and_then(VecDeque::pop_front);
        match next {
            Some(dyno_state) => Ok(Dyno {
                id: dyno_id.to_string(),
                process_type: "run".to_string(),
                command: String::new(),
                state: dyno_state,
            }),
            None => {
                state.finished.insert(dyno_id.to_string());
                Err(PlatformError::NotFound {
                    resource: format!("dynos/{dyno_id}"),
                })
            }
        }
    }

    fn list_dynos(&self, _app_name: &str) -> Result<Vec<Dyno>, PlatformError> {
        let mut state = self.state.borrow_mut();
        state.events.push("list_dynos".to_string());
        Ok(state.dynos.clone())
    }

    fn restart(&self, _app_name: &str, dyno_id: &str) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        state.events.push(format!("restart {dyno_id}"));
        Ok(())
    }

    fn restart_all(&self, _app_name: &str) -> Result<(), PlatformError> {
        let mut state = self.state.borrow_mut();
        state.events.push("restart_all".to_string());
        Ok(())
    }
}
