use std::rc::Rc;

use ember_core::Closure;

/// A call frame: the executing closure, the instruction pointer, and the
/// base pointer marking where this frame's locals begin on the value
/// stack.
///
/// `ip` holds the byte offset of the *last executed* instruction and is
/// pre-incremented by the dispatch loop, hence the -1 start.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    pub ip: isize,
    pub bp: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, bp: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            bp,
        }
    }

    pub fn instructions(&self) -> &[u8] {
        &self.closure.func.instructions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::CompiledFunction;

    #[test]
    fn test_new_frame_starts_before_first_instruction() {
        let closure = Rc::new(Closure {
            func: Rc::new(CompiledFunction {
                instructions: vec![1, 2, 3],
                num_locals: 0,
                num_params: 0,
            }),
            free: vec![],
        });
        let frame = Frame::new(closure, 4);
        assert_eq!(frame.ip, -1);
        assert_eq!(frame.bp, 4);
        assert_eq!(frame.instructions(), &[1, 2, 3]);
    }
}
