use super::*;

impl Runtime {
    /// Runs everything the top-level script left behind: microtasks, the
    /// document lifecycle events, then timers in virtual time.
    pub(crate) fn run_event_loop(&mut self) -> Result<()> {
        self.drain_microtasks()?;
        self.set_ready_state("interactive");
        self.dispatch_event("DOMContentLoaded")?;
        self.set_ready_state("complete");
        self.dispatch_event("load")?;
        while let Some(task) = self.scheduler.pop_next_task() {
            self.scheduler.note_timer_step()?;
            tracing::trace!(id = task.id, due_at = task.due_at, "running timer");
            self.scheduler.begin_task(task.id);
            let outcome = match &task.callback {
                Value::String(code) => self.eval_timer_source(code.as_str()),
                callback => {
                    let this = self.global_value();
                    self.call_function(callback, this, task.args.clone()).map(|_| ())
                }
            };
            let cleared = self.scheduler.finish_task();
            self.absorb_callback_error(outcome)?;
            if !cleared {
                self.scheduler.reschedule(task);
            }
            self.drain_microtasks()?;
        }
        Ok(())
    }

    pub(crate) fn drain_microtasks(&mut self) -> Result<()> {
        while let Some(task) = self.scheduler.microtask_queue.pop_front() {
            self.budget.tick()?;
            let depth = self.callee_stack.len();
            let outcome = self.run_microtask(task);
            self.callee_stack.truncate(depth);
            self.absorb_callback_error(outcome)?;
        }
        Ok(())
    }

    fn dispatch_event(&mut self, event_type: &str) -> Result<()> {
        let listeners = self
            .listeners
            .iter()
            .filter(|(kind, _)| kind == event_type)
            .map(|(_, callback)| callback.clone())
            .collect::<Vec<_>>();
        if listeners.is_empty() {
            return Ok(());
        }
        tracing::debug!(event = event_type, listeners = listeners.len(), "dispatching event");
        let event = self.new_object();
        {
            let mut borrowed = event.borrow_mut();
            borrowed.set("type", Value::string(event_type));
            borrowed.set("target", self.global_value());
            borrowed.set("timeStamp", Value::Number(self.scheduler.now_ms as f64));
        }
        for listener in listeners {
            let this = self.global_value();
            let outcome = self
                .call_function(&listener, this, vec![Value::Object(event.clone())])
                .map(|_| ());
            self.absorb_callback_error(outcome)?;
            self.drain_microtasks()?;
        }
        Ok(())
    }

    fn set_ready_state(&mut self, state: &str) {
        if let Some(Value::Object(document)) = self.global.borrow().get_own("document") {
            document.borrow_mut().set("readyState", Value::string(state));
        }
    }

    /// `setTimeout("code", ms)` evaluates the string in the global scope.
    fn eval_timer_source(&mut self, code: &str) -> Result<()> {
        let program = match parse_script(code) {
            Ok(program) => program,
            Err(Error::ScriptParse(message)) => return Err(self.syntax_error(message)),
            Err(err) => return Err(err),
        };
        let scope = self.global_scope.clone();
        self.eval_program(&program, &scope).map(|_| ())
    }

    /// An error escaping a callback is reported to the console the way a
    /// browser reports an uncaught exception; aborts still end the run.
    fn absorb_callback_error(&mut self, outcome: Result<()>) -> Result<()> {
        let message = match outcome {
            Ok(()) => return Ok(()),
            Err(Error::ScriptThrown(thrown)) => describe_thrown(thrown.value()),
            Err(Error::ScriptRuntime(message)) => message,
            Err(err) => return Err(err),
        };
        tracing::debug!(%message, "uncaught error in callback");
        self.console.push("error", format!("Uncaught {message}"));
        self.callee_stack.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console_texts(rt: &Runtime) -> Vec<String> {
        rt.console
            .messages
            .iter()
            .map(|message| message.text.clone())
            .collect()
    }

    #[test]
    fn timers_run_in_due_order_after_load() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "setTimeout(function () { console.log('late'); }, 50);\
             setTimeout(function () { console.log('early'); }, 10);\
             window.addEventListener('load', function (e) { console.log(e.type); });\
             console.log('sync');",
        )?;
        rt.run_event_loop()?;
        assert_eq!(console_texts(&rt), vec!["sync", "load", "early", "late"]);
        Ok(())
    }

    #[test]
    fn callback_errors_are_logged_and_the_loop_continues() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script(
            "setTimeout(function () { null.x.y = 1; throw new TypeError('bad'); }, 0);\
             setTimeout(function () { console.log('after'); }, 5);",
        )?;
        rt.run_event_loop()?;
        assert_eq!(console_texts(&rt), vec!["Uncaught TypeError: bad", "after"]);
        Ok(())
    }

    #[test]
    fn string_timer_callbacks_are_evaluated_globally() -> Result<()> {
        let mut rt = Runtime::new(&AnalysisConfig::default());
        rt.run_script("var hits = 0; setTimeout('hits = hits + 1', 0);")?;
        rt.run_event_loop()?;
        assert_eq!(rt.get_member(&rt.global_value(), "hits", None)?, Value::Number(1.0));
        Ok(())
    }
}
