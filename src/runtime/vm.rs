use crate::bytecode::{Op, Program, Type};
use crate::runtime::runtime_error::DecodeError;
use crate::runtime::sink::{FieldSink, SinkError};
use crate::runtime::wire::{Reader, utf8};
use std::io::Read;
use tracing::{debug, trace};

#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Emit every executed op as a `trace` event.
    pub trace: bool,
    /// Deepest sink nesting a run may reach. `None` decodes any depth; the
    /// native stack grows on the heap as needed.
    pub max_depth: Option<usize>,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            trace: false,
            max_depth: None,
        }
    }
}

/// Headroom left on the current stack before a nested run moves to a fresh
/// heap-allocated segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Run `f`, first switching to a new stack segment if the current one is
/// nearly exhausted. Every per-level recursion in the runtime goes through
/// here.
pub(crate) fn with_stack<T>(f: impl FnOnce() -> T) -> T {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, f)
}

/// Executes decode programs.
///
/// A `Vm` only carries configuration. Each [`eval`](Vm::eval) gets its own
/// registers, stacks and input cursor, so one `Vm` and one `Program` can
/// serve any number of threads.
#[derive(Debug, Clone, Default)]
pub struct Vm {
    config: VmConfig,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Decode one value from `input` into `sink`.
    ///
    /// On success the root sink has been finalized. On failure the sink is
    /// left in whatever state the run reached.
    pub fn eval<R: Read>(
        &self,
        input: R,
        program: &Program,
        sink: &mut dyn FieldSink,
    ) -> Result<(), DecodeError> {
        let mut run = Run {
            program,
            config: &self.config,
            input: Reader::new(input),
            frame: Frame::default(),
            cond: false,
            loops: Vec::new(),
            calls: Vec::new(),
            ip: 0,
            depth: 0,
        };

        match run.exec(sink)? {
            Flow::Done => {}
            Flow::Exit => return Err(DecodeError::internal(run.ip, "exit from the root sink")),
        }
        sink.finalize().map_err(|source| DecodeError::Sink {
            ip: run.ip,
            source,
        })?;

        if self.config.trace {
            debug!(bytes = run.input.position(), "decode finished");
        }
        Ok(())
    }
}

/// Decode with the default configuration.
pub fn eval<R: Read>(
    input: R,
    program: &Program,
    sink: &mut dyn FieldSink,
) -> Result<(), DecodeError> {
    Vm::new().eval(input, program, sink)
}

/// Typed registers. A read fills every register the value can widen into;
/// `Set` then picks the one matching the reader's type.
#[derive(Debug, Default)]
struct Frame {
    boolean: bool,
    int: i32,
    long: i64,
    float: f32,
    double: f64,
    /// Shared by bytes, string and fixed.
    bytes: Vec<u8>,
}

/// How a nested `exec` ended.
enum Flow {
    /// `Exit`: hand control back to the parent sink.
    Exit,
    /// `Return` with an empty call stack, or the end of the program.
    Done,
}

struct Run<'p, R> {
    program: &'p Program,
    config: &'p VmConfig,
    input: Reader<R>,
    frame: Frame,
    cond: bool,
    loops: Vec<i64>,
    /// Return addresses.
    calls: Vec<usize>,
    ip: usize,
    depth: usize,
}

fn sink_error(ip: usize) -> impl Fn(SinkError) -> DecodeError {
    move |source| DecodeError::Sink { ip, source }
}

impl<R: Read> Run<'_, R> {
    fn exec(&mut self, sink: &mut dyn FieldSink) -> Result<Flow, DecodeError> {
        let program = self.program;
        let ops = program.ops();

        while self.ip < ops.len() {
            let ip = self.ip;
            let op = ops[ip];
            if self.config.trace {
                trace!(ip, op = %op.mnemonic(), long = self.frame.long, depth = self.depth, "exec");
            }
            self.ip += 1;

            match op {
                // Input and sink
                Op::Read(t) => self.read(t)?,
                Op::Set(t) => self.set(t, ip, sink)?,
                Op::SetDefault(field) => sink.set_field_to_default(field).map_err(sink_error(ip))?,
                Op::SetNull(field) => sink.set_field_to_null(field).map_err(sink_error(ip))?,
                Op::SetUnionBranch(branch) => {
                    sink.set_union_branch(branch).map_err(sink_error(ip))?
                }
                Op::SetEnumSymbol(symbol) => sink.set_int(symbol).map_err(sink_error(ip))?,

                Op::Enter(field) => {
                    let child = sink.get(field).map_err(sink_error(ip))?;
                    self.descend(child)?;
                }
                Op::AppendArray => {
                    let child = sink.append_array_element().map_err(sink_error(ip))?;
                    self.descend(child)?;
                }
                Op::AppendMap => {
                    let key = self.take_string()?;
                    let child = sink.append_map_entry(key).map_err(sink_error(ip))?;
                    self.descend(child)?;
                }
                Op::Exit => {
                    sink.finalize().map_err(sink_error(ip))?;
                    return Ok(Flow::Exit);
                }

                // Evaluation and control flow
                Op::EvalEqual(v) => self.cond = self.frame.long == v,
                Op::EvalGreater(v) => self.cond = self.frame.long > v,
                Op::CondJump(target) => {
                    if self.cond {
                        self.ip = target;
                    }
                }
                Op::Jump(target) => self.ip = target,
                Op::AddLong(v) => {
                    self.frame.long = self
                        .frame
                        .long
                        .checked_add(v)
                        .ok_or_else(|| self.malformed("block count overflow"))?;
                }
                Op::MultLong(v) => {
                    self.frame.long = self
                        .frame
                        .long
                        .checked_mul(v)
                        .ok_or_else(|| self.malformed("block count overflow"))?;
                }
                Op::PushLoop => self.loops.push(self.frame.long),
                Op::PopLoop => {
                    self.frame.long = self
                        .loops
                        .pop()
                        .ok_or_else(|| DecodeError::internal(ip, "loop stack underflow"))?;
                }
                Op::HintSize => {
                    let size = usize::try_from(self.frame.long)
                        .map_err(|_| self.malformed("block count out of range"))?;
                    sink.hint_size(size).map_err(sink_error(ip))?;
                }
                Op::Call(target) => {
                    self.calls.push(self.ip);
                    self.ip = target;
                }
                Op::Return => match self.calls.pop() {
                    Some(ret) => self.ip = ret,
                    None => return Ok(Flow::Done),
                },
                Op::Halt(error_id) => {
                    let message = program
                        .error_message(error_id)
                        .unwrap_or("unknown error")
                        .to_string();
                    return Err(DecodeError::SchemaMismatch { error_id, message });
                }
            }
        }

        Ok(Flow::Done)
    }

    fn descend(&mut self, child: &mut dyn FieldSink) -> Result<(), DecodeError> {
        if let Some(limit) = self.config.max_depth {
            if self.depth >= limit {
                return Err(DecodeError::NestingTooDeep {
                    limit,
                    position: self.input.position(),
                });
            }
        }

        self.depth += 1;
        let flow = with_stack(|| self.exec(child))?;
        self.depth -= 1;

        match flow {
            Flow::Exit => Ok(()),
            Flow::Done => Err(DecodeError::internal(
                self.ip,
                "program ended inside a nested sink",
            )),
        }
    }

    fn read(&mut self, t: Type) -> Result<(), DecodeError> {
        let frame = &mut self.frame;
        match t {
            Type::Null => {}
            Type::Boolean => frame.boolean = self.input.read_boolean()?,
            Type::Int => {
                let v = self.input.read_int()?;
                frame.int = v;
                frame.long = i64::from(v);
                frame.float = v as f32;
                frame.double = f64::from(v);
            }
            Type::Long => {
                let v = self.input.read_long()?;
                frame.long = v;
                frame.float = v as f32;
                frame.double = v as f64;
            }
            Type::Float => {
                let v = self.input.read_float()?;
                frame.float = v;
                frame.double = f64::from(v);
            }
            Type::Double => frame.double = self.input.read_double()?,
            Type::Bytes | Type::String => frame.bytes = self.input.read_bytes()?,
            Type::Fixed(size) => frame.bytes = self.input.read_fixed(size)?,
            Type::UnusedLong => {
                self.input.read_long()?;
            }
        }
        Ok(())
    }

    fn set(&mut self, t: Type, ip: usize, sink: &mut dyn FieldSink) -> Result<(), DecodeError> {
        let result = match t {
            Type::Null => Ok(()),
            Type::Boolean => sink.set_boolean(self.frame.boolean),
            Type::Int => sink.set_int(self.frame.int),
            Type::Long => sink.set_long(self.frame.long),
            Type::Float => sink.set_float(self.frame.float),
            Type::Double => sink.set_double(self.frame.double),
            Type::Bytes | Type::Fixed(_) => sink.set_bytes(std::mem::take(&mut self.frame.bytes)),
            Type::String => {
                let s = self.take_string()?;
                sink.set_string(s)
            }
            Type::UnusedLong => return Err(DecodeError::internal(ip, "set of an unused long")),
        };
        result.map_err(sink_error(ip))
    }

    fn take_string(&mut self) -> Result<String, DecodeError> {
        let bytes = std::mem::take(&mut self.frame.bytes);
        utf8(bytes, self.input.position())
    }

    fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::malformed(self.input.position(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn program(ops: Vec<Op>, errors: &[&str]) -> Program {
        Program {
            ops,
            methods: IndexMap::new(),
            errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[derive(Debug, Default)]
    struct Longs {
        values: Vec<i64>,
        hints: Vec<usize>,
        finalized: usize,
    }

    impl FieldSink for Longs {
        fn set_long(&mut self, value: i64) -> Result<(), SinkError> {
            self.values.push(value);
            Ok(())
        }

        fn hint_size(&mut self, size: usize) -> Result<(), SinkError> {
            self.hints.push(size);
            Ok(())
        }

        fn finalize(&mut self) -> Result<(), SinkError> {
            self.finalized += 1;
            Ok(())
        }
    }

    #[derive(Debug, Default)]
    struct List {
        items: Vec<Longs>,
        hints: Vec<usize>,
    }

    impl FieldSink for List {
        fn append_array_element(&mut self) -> Result<&mut dyn FieldSink, SinkError> {
            self.items.push(Longs::default());
            let last = self.items.len() - 1;
            Ok(&mut self.items[last])
        }

        fn hint_size(&mut self, size: usize) -> Result<(), SinkError> {
            self.hints.push(size);
            Ok(())
        }
    }

    // array<long> read into a List
    fn array_program() -> Program {
        program(
            vec![
                Op::Read(Type::Long),
                Op::EvalEqual(0),
                Op::CondJump(18),
                Op::EvalGreater(0),
                Op::CondJump(8),
                Op::Read(Type::UnusedLong),
                Op::MultLong(-1),
                Op::HintSize,
                Op::PushLoop,
                Op::AppendArray,
                Op::Read(Type::Long),
                Op::Set(Type::Long),
                Op::Exit,
                Op::PopLoop,
                Op::AddLong(-1),
                Op::EvalEqual(0),
                Op::CondJump(0),
                Op::Jump(8),
                Op::Return,
            ],
            &[],
        )
    }

    fn run_ops(ops: Vec<Op>, input: &[u8]) -> Result<Longs, DecodeError> {
        let mut sink = Longs::default();
        Vm::new().eval(input, &program(ops, &["bad branch"]), &mut sink)?;
        Ok(sink)
    }

    // =========================================================================
    // Basic execution
    // =========================================================================

    #[test]
    fn test_read_set_long() {
        let sink = run_ops(
            vec![Op::Read(Type::Long), Op::Set(Type::Long), Op::Return],
            &[0x54],
        )
        .unwrap();
        assert_eq!(sink.values, vec![42]);
        assert_eq!(sink.finalized, 1);
    }

    #[test]
    fn test_int_widens_into_long_register() {
        let sink = run_ops(vec![Op::Read(Type::Int), Op::Set(Type::Long)], &[0x03]).unwrap();
        assert_eq!(sink.values, vec![-2]);
    }

    #[test]
    fn test_end_of_program_is_done() {
        let sink = run_ops(vec![], &[]).unwrap();
        assert!(sink.values.is_empty());
        assert_eq!(sink.finalized, 1);
    }

    #[test]
    fn test_call_and_return() {
        let ops = vec![
            Op::Call(3),
            Op::Call(3),
            Op::Return,
            Op::Read(Type::Long),
            Op::Set(Type::Long),
            Op::Return,
        ];
        let sink = run_ops(ops, &[0x02, 0x04]).unwrap();
        assert_eq!(sink.values, vec![1, 2]);
    }

    #[test]
    fn test_halt_reports_message() {
        let err = run_ops(vec![Op::Halt(0)], &[]).unwrap_err();
        match err {
            DecodeError::SchemaMismatch { error_id, message } => {
                assert_eq!(error_id, 0);
                assert_eq!(message, "bad branch");
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_sink_operation() {
        let err = run_ops(vec![Op::Read(Type::Int), Op::Set(Type::Int)], &[0x02]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Sink {
                ip: 1,
                source: SinkError::Unsupported { op: "set_int" }
            }
        ));
    }

    #[test]
    fn test_exit_at_root_is_internal() {
        let err = run_ops(vec![Op::Exit], &[]).unwrap_err();
        assert!(matches!(err, DecodeError::Internal { .. }));
    }

    #[test]
    fn test_pop_empty_loop_stack() {
        let err = run_ops(vec![Op::PopLoop], &[]).unwrap_err();
        assert!(matches!(err, DecodeError::Internal { ip: 0, .. }));
    }

    #[test]
    fn test_negate_min_long_overflows() {
        // zig-zag of i64::MIN
        let mut input = vec![0xff; 9];
        input.push(0x01);
        let err = run_ops(vec![Op::Read(Type::Long), Op::MultLong(-1)], &input).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { .. }));
    }

    #[test]
    fn test_truncated_input() {
        let err = run_ops(vec![Op::Read(Type::Double)], &[0, 0, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 0, .. }));
    }

    #[test]
    fn test_invalid_utf8_string() {
        let ops = vec![Op::Read(Type::String), Op::Set(Type::String), Op::Return];
        let err = run_ops(ops, &[0x02, 0xff]).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedInput { position: 2, .. }));
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    #[test]
    fn test_array_single_block() {
        let mut sink = List::default();
        // count 2, 7, -3, end
        Vm::new()
            .eval(&[0x04u8, 0x0e, 0x05, 0x00][..], &array_program(), &mut sink)
            .unwrap();

        let values: Vec<i64> = sink.items.iter().flat_map(|i| i.values.clone()).collect();
        assert_eq!(values, vec![7, -3]);
        assert!(sink.items.iter().all(|i| i.finalized == 1));
        assert!(sink.hints.is_empty());
    }

    #[test]
    fn test_array_negative_block_hints() {
        let mut sink = List::default();
        // count -2, byte size 2, 1, 2, end
        Vm::new()
            .eval(&[0x03u8, 0x04, 0x02, 0x04, 0x00][..], &array_program(), &mut sink)
            .unwrap();

        assert_eq!(sink.items.len(), 2);
        assert_eq!(sink.hints, vec![2]);
    }

    #[test]
    fn test_array_empty() {
        let mut sink = List::default();
        let mut input = &[0x00u8, 0xff][..];
        Vm::new().eval(&mut input, &array_program(), &mut sink).unwrap();
        assert!(sink.items.is_empty());
        assert_eq!(input, &[0xff]);
    }

    // =========================================================================
    // Limits and configuration
    // =========================================================================

    struct Nest;

    impl FieldSink for Nest {
        fn get(&mut self, _index: usize) -> Result<&mut dyn FieldSink, SinkError> {
            Ok(self)
        }
    }

    #[test]
    fn test_depth_limit() {
        let vm = Vm::with_config(VmConfig {
            max_depth: Some(3),
            ..VmConfig::default()
        });
        // Enter forever
        let p = program(vec![Op::Enter(0), Op::Jump(0)], &[]);
        let err = vm.eval(std::io::empty(), &p, &mut Nest).unwrap_err();
        assert!(matches!(err, DecodeError::NestingTooDeep { limit: 3, .. }));
    }

    // A recursive method: each 1 in the input enters one level deeper, a 0
    // unwinds every level.
    fn nesting_program() -> Program {
        program(
            vec![
                Op::Call(2),
                Op::Return,
                Op::Read(Type::Long),
                Op::EvalEqual(0),
                Op::CondJump(9),
                Op::Enter(0),
                Op::Call(2),
                Op::Exit,
                Op::Return,
                Op::Return,
            ],
            &[],
        )
    }

    #[test]
    fn test_deep_nesting_has_no_default_limit() {
        assert_eq!(VmConfig::default().max_depth, None);

        let levels = 20_000;
        let mut input = vec![0x02u8; levels];
        input.push(0x00);

        let mut rest = &input[..];
        Vm::new()
            .eval(&mut rest, &nesting_program(), &mut Nest)
            .unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn test_depth_limit_on_recursive_method() {
        let vm = Vm::with_config(VmConfig {
            max_depth: Some(100),
            ..VmConfig::default()
        });
        let mut input = vec![0x02u8; 200];
        input.push(0x00);

        let err = vm.eval(&input[..], &nesting_program(), &mut Nest).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NestingTooDeep {
                limit: 100,
                position: 101
            }
        ));
    }

    #[test]
    fn test_trace_does_not_change_result() {
        let vm = Vm::with_config(VmConfig {
            trace: true,
            ..VmConfig::default()
        });
        let mut sink = List::default();
        vm.eval(&[0x02u8, 0x02, 0x00][..], &array_program(), &mut sink)
            .unwrap();
        assert_eq!(sink.items.len(), 1);
    }

    #[test]
    fn test_vm_and_program_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Vm>();
        assert_send_sync::<Program>();
    }

    #[test]
    fn test_concurrent_runs() {
        let vm = Vm::new();
        let program = array_program();

        std::thread::scope(|scope| {
            let handles: Vec<_> = (1..=4i64)
                .map(|n| {
                    let vm = &vm;
                    let program = &program;
                    scope.spawn(move || {
                        let input = [0x02, (n * 2) as u8, 0x00];
                        let mut sink = List::default();
                        vm.eval(&input[..], program, &mut sink).unwrap();
                        sink.items[0].values[0]
                    })
                })
                .collect();

            let results: Vec<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            assert_eq!(results, vec![1, 2, 3, 4]);
        });
    }
}
