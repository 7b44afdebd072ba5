use num_enum::{IntoPrimitive, TryFromPrimitive};

/// The opcode byte occupying bits `0..8` of every instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
    Mod = 4,
    Eq = 5,
    Ne = 6,
    Lt = 7,
    Le = 8,
    Gt = 9,
    Ge = 10,
    And = 11,
    Or = 12,
    Xor = 13,
    Shl = 14,
    Shr = 15,
    Neg = 16,
    BitNot = 17,
    LogNot = 18,
    TypeOf = 19,
    SizeOf = 20,
    NthArg = 21,
    Concat = 22,
    Inc = 23,
    Dec = 24,
    Call = 25,
    Ret = 26,
    Jmp = 27,
    Jze = 28,
    Jnz = 29,
    LdConst = 30,
    LdSym = 31,
    Mov = 32,
    Argv = 33,
    NewArr = 34,
    NewHash = 35,
    IdxGet = 36,
    IdxSet = 37,
    ArrPush = 38,
    /// Marker preceding a nested function header; not itself executed.
    Function = 39,
    GlbVal = 40,
    Closure = 41,
    LdUpval = 42,
    Method = 43,
    PropGet = 44,
    PropSet = 45,
}
