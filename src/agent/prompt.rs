//! Iteration prompts.
//!
//! The system prompt stays small on purpose: it is re-sent on every model
//! call, so each extra line multiplies across all tool calls of an iteration.

/// Instructions shared by every iteration.
pub const SYSTEM_PROMPT: &str = r#"You are Ralph, an autonomous agent working iteratively.

CRITICAL RULES (MUST FOLLOW):
1. FIRST: Read state.md to see what's been done
2. Do EXACTLY ONE focused task - create OR edit ONE file in output/
3. LAST: Update state.md before finishing

STRICT LIMIT: Create/edit MAX 1 FILE per iteration.

QUALITY: Generate detailed, useful content. No shallow placeholders.

state.md format:
```
## Iteration
[increment the number]

## Completed Work
- [x] [what you just did]

## Files Created
- [list all files in output/]
```

Your memory is ONLY in files. Update state.md or the next iteration won't know what you did."#;

/// Build the full prompt for one iteration.
///
/// The agent is told half of `max_steps` so it finishes with headroom left.
pub fn iteration_prompt(iteration: u64, task: &str, max_steps: u32) -> String {
    let advertised = (max_steps / 2).max(1);
    format!(
        "{SYSTEM_PROMPT}

## Iteration {iteration}

TASK: {task}

STRICT INSTRUCTIONS:
1. Read state.md ONCE (shows what's been completed)
2. Do EXACTLY ONE task: Create OR edit ONE file in output/
3. Update state.md (increment iteration, add what you did)
4. STOP IMMEDIATELY after updating state.md

EFFICIENCY RULES:
- You have a limit of {advertised} steps, don't waste them
- Don't re-read files, don't overthink, don't validate
- Workflow: read -> create/edit -> update -> STOP
"
    )
}
