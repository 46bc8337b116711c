use crate::tasks::store::TaskStore;
use crate::tasks::task::TaskId;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum VisitState {
    Visiting,
    Visited,
}

impl TaskStore {
    /// 若新增依赖边 `task -> dependency` 会闭合一个环，返回环路径
    ///
    /// 路径从 `task` 出发、经 `dependency` 回到 `task`。
    pub fn would_close_cycle(&self, task: TaskId, dependency: TaskId) -> Option<Vec<TaskId>> {
        if task == dependency {
            return Some(vec![task, task]);
        }
        let mut visited: HashMap<TaskId, VisitState> = HashMap::new();
        let mut path = vec![task];
        if self.dfs_reaches(dependency, task, &mut visited, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// 检测循环依赖，返回所有循环路径（用于校验持久化快照）
    pub fn detect_circular_dependencies(&self) -> Vec<Vec<TaskId>> {
        let mut cycles = Vec::new();
        let mut visited: HashMap<TaskId, VisitState> = HashMap::new();
        let mut path: Vec<TaskId> = Vec::new();

        for task in self.iter() {
            if visited.get(&task.id) != Some(&VisitState::Visited) {
                self.dfs_detect_cycle(task.id, &mut visited, &mut path, &mut cycles);
            }
        }

        cycles
    }

    fn dfs_reaches(
        &self,
        from: TaskId,
        target: TaskId,
        visited: &mut HashMap<TaskId, VisitState>,
        path: &mut Vec<TaskId>,
    ) -> bool {
        path.push(from);
        if from == target {
            return true;
        }
        visited.insert(from, VisitState::Visiting);

        if let Some(task) = self.tasks.get(&from) {
            for dep_id in &task.dependencies {
                if visited.contains_key(dep_id) {
                    continue;
                }
                if self.dfs_reaches(*dep_id, target, visited, path) {
                    return true;
                }
            }
        }

        visited.insert(from, VisitState::Visited);
        path.pop();
        false
    }

    /// 深度优先搜索检测循环
    fn dfs_detect_cycle(
        &self,
        task_id: TaskId,
        visited: &mut HashMap<TaskId, VisitState>,
        path: &mut Vec<TaskId>,
        cycles: &mut Vec<Vec<TaskId>>,
    ) {
        visited.insert(task_id, VisitState::Visiting);
        path.push(task_id);

        if let Some(task) = self.tasks.get(&task_id) {
            for dep_id in &task.dependencies {
                if !self.tasks.contains_key(dep_id) {
                    continue;
                }
                match visited.get(dep_id).copied() {
                    Some(VisitState::Visiting) => {
                        if let Some(cycle_start) = path.iter().position(|id| id == dep_id) {
                            cycles.push(path[cycle_start..].to_vec());
                        }
                    }
                    Some(VisitState::Visited) => {}
                    None => {
                        self.dfs_detect_cycle(*dep_id, visited, path, cycles);
                    }
                }
            }
        }

        path.pop();
        visited.insert(task_id, VisitState::Visited);
    }
}
