use glam::DVec2;

/// One node of the navigation graph: a named map and a 2D position in the
/// fleet frame.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphWaypoint {
    pub map_name: String,
    pub position: DVec2,
}

/// Read-only topology of valid waypoints.
///
/// The manager consumes the graph purely for validation: every outgoing
/// navigation or relocalization command is checked against it before
/// dispatch. Construction and loading of the graph itself happen elsewhere.
#[derive(Debug, Clone, Default)]
pub struct NavGraph {
    waypoints: Vec<GraphWaypoint>,
}

impl NavGraph {
    pub fn new(waypoints: Vec<GraphWaypoint>) -> Self {
        Self { waypoints }
    }

    pub fn num_waypoints(&self) -> usize {
        self.waypoints.len()
    }

    pub fn waypoint(&self, index: usize) -> Option<&GraphWaypoint> {
        self.waypoints.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waypoint_lookup_is_bounds_checked() {
        let graph = NavGraph::new(vec![GraphWaypoint {
            map_name: "L1".to_owned(),
            position: DVec2::new(1.0, 2.0),
        }]);

        assert_eq!(graph.num_waypoints(), 1);
        assert_eq!(graph.waypoint(0).unwrap().map_name, "L1");
        assert!(graph.waypoint(1).is_none());
    }
}
