// A self-recursive helper sits between the source and the sink. The engine
// must converge on the cycle and still report the flow in `handler`.

fn build_filter(depth: usize, clause: String) -> String {
    if depth == 0 {
        return clause;
    }
    build_filter(depth - 1, clause)
}

fn handler() {
    let name = request_param("name");
    let filtered = build_filter(3, name);
    execute_query(filtered);
}
