//! Activation records and their reflective views.
//!
//! A [`Frame`] is the slot array of one invocation, laid out by an immutable
//! [`FrameDescriptor`]. Frames are shared (`Rc`): a generator, the locals
//! views created over it and any [`FrameSnapshot`] all alias the same slots,
//! so a store through one is visible through every other.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
};

use crate::{
    types::{Dict, Str},
    value::Value,
};

/// Name of one frame slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotIdentifier {
    /// A named binding. Compiler temporaries use names starting with `.` or `<`.
    Name(Str),
    /// Engine bookkeeping with no source-level name.
    Internal(&'static str),
}

impl SlotIdentifier {
    /// Whether the slot is exposed through `locals()`.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        self.user_name().is_some()
    }

    /// The binding name when the slot is user visible.
    #[must_use]
    pub fn user_name(&self) -> Option<&Str> {
        match self {
            Self::Name(name) if !name.starts_with('.') && !name.starts_with('<') => Some(name),
            Self::Name(_) | Self::Internal(_) => None,
        }
    }
}

impl From<&str> for SlotIdentifier {
    fn from(name: &str) -> Self {
        Self::Name(Str::new(name))
    }
}

/// Immutable slot layout shared by every frame of one code object.
///
/// The descriptor's address is its shape identity.
#[derive(Debug)]
pub struct FrameDescriptor {
    slots: Vec<SlotIdentifier>,
}

impl FrameDescriptor {
    #[must_use]
    pub fn new(slots: impl IntoIterator<Item = SlotIdentifier>) -> Rc<Self> {
        Rc::new(Self {
            slots: slots.into_iter().collect(),
        })
    }

    /// A descriptor of named slots.
    #[must_use]
    pub fn from_names(names: &[&str]) -> Rc<Self> {
        Self::new(names.iter().map(|name| SlotIdentifier::from(*name)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn slots(&self) -> &[SlotIdentifier] {
        &self.slots
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&SlotIdentifier> {
        self.slots.get(index)
    }

    /// Index of the named slot, user visible or not.
    #[must_use]
    pub fn find_slot(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, SlotIdentifier::Name(slot_name) if slot_name.as_str() == name))
    }

    /// Index of the user-visible slot bound to `name`.
    #[must_use]
    pub fn find_user_slot(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.user_name().is_some_and(|slot_name| slot_name.as_str() == name))
    }

    pub(crate) fn shape_id(self: &Rc<Self>) -> usize {
        Rc::as_ptr(self).addr()
    }
}

/// A shared activation record.
#[derive(Clone)]
pub struct Frame(Rc<FrameInner>);

struct FrameInner {
    descriptor: Rc<FrameDescriptor>,
    slots: RefCell<Vec<Value>>,
}

impl Frame {
    /// Creates a frame with every slot unbound.
    #[must_use]
    pub fn new(descriptor: Rc<FrameDescriptor>) -> Self {
        let slots = vec![Value::Undefined; descriptor.len()];
        Self(Rc::new(FrameInner {
            descriptor,
            slots: RefCell::new(slots),
        }))
    }

    #[must_use]
    pub fn descriptor(&self) -> &Rc<FrameDescriptor> {
        &self.0.descriptor
    }

    /// Reads a slot as user code sees it: cells are dereferenced and an
    /// unbound slot or empty cell reads as `None`.
    #[must_use]
    pub fn load(&self, index: usize) -> Option<Value> {
        match self.0.slots.borrow().get(index)? {
            Value::Undefined => None,
            Value::Cell(cell) => cell.get(),
            value => Some(value.clone()),
        }
    }

    /// Reads the raw slot contents, cells included.
    #[must_use]
    pub fn load_raw(&self, index: usize) -> Value {
        self.0.slots.borrow().get(index).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn load_name(&self, name: &str) -> Option<Value> {
        self.descriptor().find_slot(name).and_then(|index| self.load(index))
    }

    /// Binds a slot, writing through the cell when the slot holds one.
    pub fn store(&self, index: usize, value: Value) {
        let mut slots = self.0.slots.borrow_mut();
        match slots.get_mut(index) {
            Some(Value::Cell(cell)) => cell.set(value),
            Some(slot) => *slot = value,
            None => {}
        }
    }

    /// Replaces the raw slot contents, used to install cells.
    pub fn store_raw(&self, index: usize, value: Value) {
        if let Some(slot) = self.0.slots.borrow_mut().get_mut(index) {
            *slot = value;
        }
    }

    /// Binds the named slot. Returns false when the frame has no such slot.
    pub fn store_name(&self, name: &str, value: Value) -> bool {
        match self.descriptor().find_slot(name) {
            Some(index) => {
                self.store(index, value);
                true
            }
            None => false,
        }
    }

    /// Unbinds a slot. A cell stays installed but becomes empty.
    pub fn clear(&self, index: usize) {
        let mut slots = self.0.slots.borrow_mut();
        match slots.get_mut(index) {
            Some(Value::Cell(cell)) => cell.clear(),
            Some(slot) => *slot = Value::Undefined,
            None => {}
        }
    }

    /// The `locals()` mapping: a live view over this frame's bindings.
    #[must_use]
    pub fn locals(&self) -> Dict {
        Dict::locals_of(self)
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0).addr()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // slots can hold the generator that owns this frame
        f.debug_struct("Frame")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("slots", &self.0.descriptor.len())
            .finish()
    }
}

/// Static description of a generator's code.
#[derive(Debug, Clone)]
pub struct CodeInfo {
    name: Str,
    qualname: Str,
    filename: Str,
    first_lineno: u32,
    arg_count: usize,
    descriptor: Rc<FrameDescriptor>,
    /// `(instruction offset, line)` pairs sorted by offset.
    line_table: Vec<(i32, u32)>,
}

impl CodeInfo {
    /// Creates code info whose first `arg_count` is zero and whose qualified
    /// name equals `name`.
    #[must_use]
    pub fn new(name: &str, descriptor: Rc<FrameDescriptor>) -> Self {
        Self {
            name: Str::new(name),
            qualname: Str::new(name),
            filename: Str::new("<unknown>"),
            first_lineno: 1,
            arg_count: 0,
            descriptor,
            line_table: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_qualname(mut self, qualname: &str) -> Self {
        self.qualname = Str::new(qualname);
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Str::new(filename);
        self
    }

    #[must_use]
    pub fn with_first_lineno(mut self, lineno: u32) -> Self {
        self.first_lineno = lineno;
        self
    }

    /// Number of leading slots bound from call arguments.
    #[must_use]
    pub fn with_arg_count(mut self, arg_count: usize) -> Self {
        self.arg_count = arg_count;
        self
    }

    /// Maps instructions from `offset` onward to `line`.
    #[must_use]
    pub fn with_line(mut self, offset: i32, line: u32) -> Self {
        let at = self.line_table.partition_point(|&(o, _)| o <= offset);
        self.line_table.insert(at, (offset, line));
        self
    }

    #[must_use]
    pub fn name(&self) -> &Str {
        &self.name
    }

    #[must_use]
    pub fn qualname(&self) -> &Str {
        &self.qualname
    }

    #[must_use]
    pub fn filename(&self) -> &Str {
        &self.filename
    }

    #[must_use]
    pub fn first_lineno(&self) -> u32 {
        self.first_lineno
    }

    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.arg_count
    }

    #[must_use]
    pub fn descriptor(&self) -> &Rc<FrameDescriptor> {
        &self.descriptor
    }

    /// Source line of the instruction at `offset`.
    ///
    /// Offsets before the first table entry, including `-1` for a frame
    /// that has not started, map to the first line.
    #[must_use]
    pub fn line_for(&self, offset: i32) -> u32 {
        let at = self.line_table.partition_point(|&(o, _)| o <= offset);
        match at.checked_sub(1) {
            Some(index) => self.line_table[index].1,
            None => self.first_lineno,
        }
    }
}

/// The reflective code object returned by `gi_code`.
#[derive(Debug)]
pub struct Code {
    info: Rc<CodeInfo>,
}

impl Code {
    pub(crate) fn new(info: Rc<CodeInfo>) -> Self {
        Self { info }
    }

    #[must_use]
    pub fn co_name(&self) -> &str {
        self.info.name()
    }

    #[must_use]
    pub fn co_qualname(&self) -> &str {
        self.info.qualname()
    }

    #[must_use]
    pub fn co_filename(&self) -> &str {
        self.info.filename()
    }

    #[must_use]
    pub fn co_firstlineno(&self) -> u32 {
        self.info.first_lineno()
    }

    #[must_use]
    pub fn co_argcount(&self) -> usize {
        self.info.arg_count()
    }

    /// Names of the user-visible slots in slot order.
    #[must_use]
    pub fn co_varnames(&self) -> Vec<Str> {
        self.info
            .descriptor()
            .slots()
            .iter()
            .filter_map(SlotIdentifier::user_name)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn info(&self) -> &Rc<CodeInfo> {
        &self.info
    }
}

/// A materialized view of a frame at a given position, as returned by
/// `gi_frame` and stored in tracebacks.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    frame: Frame,
    code: Rc<CodeInfo>,
    lasti: i32,
    lineno: u32,
}

impl FrameSnapshot {
    #[must_use]
    pub fn new(frame: Frame, code: Rc<CodeInfo>, lasti: i32, lineno: u32) -> Self {
        Self {
            frame,
            code,
            lasti,
            lineno,
        }
    }

    /// Snapshot positioned at `lasti`, with the line taken from the code's line table.
    #[must_use]
    pub fn at(frame: Frame, code: Rc<CodeInfo>, lasti: i32) -> Self {
        let lineno = code.line_for(lasti);
        Self::new(frame, code, lasti, lineno)
    }

    #[must_use]
    pub fn f_lineno(&self) -> u32 {
        self.lineno
    }

    #[must_use]
    pub fn f_lasti(&self) -> i32 {
        self.lasti
    }

    #[must_use]
    pub fn f_code(&self) -> Code {
        Code::new(Rc::clone(&self.code))
    }

    /// Live `locals()` of the underlying frame.
    #[must_use]
    pub fn f_locals(&self) -> Dict {
        self.frame.locals()
    }

    #[must_use]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    #[must_use]
    pub fn code_info(&self) -> &Rc<CodeInfo> {
        &self.code
    }
}

/// One traceback entry; `tb_next` points toward the frame that raised.
#[derive(Debug)]
pub struct Traceback {
    frame: FrameSnapshot,
    lineno: u32,
    next: Option<Rc<Traceback>>,
}

impl Traceback {
    #[must_use]
    pub fn new(frame: FrameSnapshot, lineno: u32, next: Option<Rc<Self>>) -> Self {
        Self { frame, lineno, next }
    }

    #[must_use]
    pub fn tb_frame(&self) -> &FrameSnapshot {
        &self.frame
    }

    #[must_use]
    pub fn tb_lineno(&self) -> u32 {
        self.lineno
    }

    #[must_use]
    pub fn tb_next(&self) -> Option<&Rc<Self>> {
        self.next.as_ref()
    }

    /// Number of entries in the chain starting here.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.next.as_deref();
        while let Some(tb) = current {
            depth += 1;
            current = tb.next.as_deref();
        }
        depth
    }
}
